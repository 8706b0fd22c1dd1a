//! Authoritative ref store (§4.4): CAS ref updates, symbolic resolution,
//! reflog, branch-protection enforcement. Backed by the `refs` table.

pub mod protection;
pub mod reflog;

use std::sync::Arc;

use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use tokio::sync::Mutex as AsyncMutex;

use crate::errors::CellError;
use crate::hash::ObjectHash;
use crate::object_store::ObjectStore;
use crate::schema::refs;

use reflog::Reflog;

const MAX_SYMBOLIC_DEPTH: usize = 10;
const MAX_ANCESTOR_WALK: usize = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefKind {
    Direct,
    Symbolic,
}

impl RefKind {
    fn as_str(&self) -> &'static str {
        match self {
            RefKind::Direct => "sha",
            RefKind::Symbolic => "symbolic",
        }
    }

    fn from_str(s: &str) -> RefKind {
        match s {
            "symbolic" => RefKind::Symbolic,
            _ => RefKind::Direct,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefValue {
    pub name: String,
    pub target: String,
    pub kind: RefKind,
}

/// Options accepted by `update_ref`'s CAS contract.
#[derive(Debug, Clone, Default)]
pub struct UpdateRefOptions {
    pub expected_old_sha: Option<String>,
    pub create: bool,
    pub force: bool,
    pub approval_token: Option<String>,
}

pub struct RefStore {
    db: DatabaseConnection,
    object_store: Arc<ObjectStore>,
    per_ref_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    reflog: Reflog,
}

impl RefStore {
    pub fn new(db: DatabaseConnection, object_store: Arc<ObjectStore>) -> Self {
        RefStore {
            db,
            object_store,
            per_ref_locks: DashMap::new(),
            reflog: Reflog::new(),
        }
    }

    /// Exposed for operators managing `branch_protection` rows out of band;
    /// rule management isn't part of this component's own API (§4.4).
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    fn lock_for(&self, name: &str) -> Arc<AsyncMutex<()>> {
        self.per_ref_locks.entry(name.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// §4.4: the terminal sha of every non-deleted ref must exist in the
    /// `ObjectStore` before the ref write commits. The all-zero sha is the
    /// wire protocol's deletion marker and is exempt.
    async fn require_object_exists(&self, sha: &str) -> Result<(), CellError> {
        if !sha.is_empty() && sha.bytes().all(|b| b == b'0') {
            return Ok(());
        }
        let hash = sha.parse::<ObjectHash>().map_err(|_| CellError::Invalid(format!("MALFORMED_SHA: {sha}")))?;
        if !self.object_store.has_object(&hash).await? {
            return Err(CellError::Invalid(format!("OBJECT_NOT_FOUND: {sha}")));
        }
        Ok(())
    }

    /// Lock-free read; last-committer-wins.
    pub async fn get_ref(&self, name: &str) -> Result<Option<RefValue>, CellError> {
        let row = refs::Entity::find_by_id(name.to_string()).one(&self.db).await?;
        Ok(row.map(|r| RefValue {
            name: r.name,
            target: r.target,
            kind: RefKind::from_str(&r.r#type),
        }))
    }

    pub async fn update_ref(&self, name: &str, new_sha: &str, opts: UpdateRefOptions) -> Result<(), CellError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        self.require_object_exists(new_sha).await?;

        let existing = self.get_ref(name).await?;

        if let Some(rule) = protection::find_matching_rule(&self.db, name).await? {
            if rule.required_reviews > 0 && opts.approval_token.is_none() {
                return Err(CellError::Protected(format!("{name}: REVIEWS_MISSING")));
            }
            if rule.prevent_force_push && !opts.force {
                if let Some(existing) = &existing {
                    if existing.target != new_sha {
                        let is_ff = self.is_descendant(new_sha, &existing.target).await?;
                        if !is_ff {
                            return Err(CellError::Protected(format!("{name}: non-fast-forward update rejected")));
                        }
                    }
                }
            }
        }

        match (&existing, opts.create) {
            (None, false) => return Err(CellError::NotFound(format!("NO_SUCH_REF: {name}"))),
            (Some(_), true) => return Err(CellError::Conflict(format!("REF_EXISTS: {name}"))),
            _ => {}
        }

        if let Some(expected) = &opts.expected_old_sha {
            let current = existing.as_ref().map(|r| r.target.as_str()).unwrap_or("");
            if current != expected {
                return Err(CellError::Conflict(format!("REF_CONFLICT: {name}")));
            }
        }

        let old_target = existing.as_ref().map(|r| r.target.clone()).unwrap_or_default();
        let now = chrono::Utc::now();
        let active = refs::ActiveModel {
            name: Set(name.to_string()),
            target: Set(new_sha.to_string()),
            r#type: Set(RefKind::Direct.as_str().to_string()),
            updated_at: Set(now),
        };
        match existing {
            Some(_) => {
                refs::Entity::update(active).exec(&self.db).await?;
            }
            None => {
                active.insert(&self.db).await?;
            }
        }
        self.reflog.append(name, old_target, new_sha.to_string(), "update-ref");
        Ok(())
    }

    pub async fn delete_ref(&self, name: &str) -> Result<(), CellError> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().await;

        if let Some(rule) = protection::find_matching_rule(&self.db, name).await? {
            if rule.prevent_deletion {
                return Err(CellError::Protected(format!("{name}: PROTECTED")));
            }
        }

        let existing = self.get_ref(name).await?.ok_or_else(|| CellError::NotFound(format!("NO_SUCH_REF: {name}")))?;
        refs::Entity::delete_by_id(name.to_string()).exec(&self.db).await?;
        self.reflog.append(name, existing.target, String::new(), "delete-ref");
        Ok(())
    }

    /// Lexicographic listing, optionally filtered by name prefix. Acquires a
    /// single consistent snapshot via one query, so concurrent updates can't
    /// produce a partial view.
    pub async fn list_refs(&self, prefix: Option<&str>) -> Result<Vec<RefValue>, CellError> {
        let mut query = refs::Entity::find().order_by_asc(refs::Column::Name);
        if let Some(prefix) = prefix {
            query = query.filter(refs::Column::Name.starts_with(prefix));
        }
        let rows = query.all(&self.db).await?;
        Ok(rows
            .into_iter()
            .map(|r| RefValue {
                name: r.name,
                target: r.target,
                kind: RefKind::from_str(&r.r#type),
            })
            .collect())
    }

    /// Chases symbolic refs to a terminal `(name, sha)`, bounded to avoid
    /// infinite loops.
    pub async fn resolve_ref(&self, name: &str) -> Result<(String, String), CellError> {
        let mut current = name.to_string();
        for _ in 0..MAX_SYMBOLIC_DEPTH {
            let value = self
                .get_ref(&current)
                .await?
                .ok_or_else(|| CellError::NotFound(format!("NO_SUCH_REF: {current}")))?;
            match value.kind {
                RefKind::Direct => return Ok((value.name, value.target)),
                RefKind::Symbolic => current = value.target,
            }
        }
        Err(CellError::Invalid(format!("CYCLE: {name}")))
    }

    /// §4.4: no packed-refs support in this design.
    pub fn read_packed_refs(&self) -> Vec<RefValue> {
        Vec::new()
    }

    pub async fn update_head(&self, ref_name: &str, symbolic: bool) -> Result<(), CellError> {
        if !symbolic {
            self.require_object_exists(ref_name).await?;
        }
        let now = chrono::Utc::now();
        let existing = self.get_ref("HEAD").await?;
        let old_target = existing.as_ref().map(|r| r.target.clone()).unwrap_or_default();
        let active = refs::ActiveModel {
            name: Set("HEAD".to_string()),
            target: Set(ref_name.to_string()),
            r#type: Set(if symbolic { RefKind::Symbolic.as_str() } else { RefKind::Direct.as_str() }.to_string()),
            updated_at: Set(now),
        };
        match existing {
            Some(_) => {
                refs::Entity::update(active).exec(&self.db).await?;
            }
            None => {
                active.insert(&self.db).await?;
            }
        }
        self.reflog.append("HEAD", old_target, ref_name.to_string(), "update-head");
        Ok(())
    }

    pub fn reflog_for(&self, name: &str) -> Vec<reflog::ReflogEntry> {
        self.reflog.for_ref(name)
    }

    /// Walks commit parents from `descendant` looking for `ancestor`,
    /// bounded to `MAX_ANCESTOR_WALK` commits (§4.4 fast-forward check).
    pub async fn is_descendant(&self, descendant: &str, ancestor: &str) -> Result<bool, CellError> {
        if descendant == ancestor {
            return Ok(true);
        }
        let mut frontier = vec![descendant.to_string()];
        let mut visited = std::collections::HashSet::new();
        let mut walked = 0usize;

        while let Some(sha_hex) = frontier.pop() {
            if !visited.insert(sha_hex.clone()) {
                continue;
            }
            walked += 1;
            if walked > MAX_ANCESTOR_WALK {
                break;
            }
            if sha_hex == ancestor {
                return Ok(true);
            }
            let Ok(hash) = sha_hex.parse::<ObjectHash>() else { continue };
            if let Some(commit) = self.object_store.get_commit(&hash).await? {
                for parent in commit.parent_commit_ids {
                    frontier.push(parent.to_string());
                }
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::codec::ObjectType;
    use crate::config::ObjectStoreConfig;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    async fn test_ref_store() -> (RefStore, Arc<ObjectStore>) {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let bulk = Arc::new(MemoryBulkStore::new());
        let object_store = Arc::new(ObjectStore::new(db.clone(), bulk, ObjectStoreConfig::default(), "test"));
        (RefStore::new(db, object_store.clone()), object_store)
    }

    #[tokio::test]
    async fn creates_and_reads_back_a_ref() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (store, objects) = test_ref_store().await;
        let sha = objects.put_object(ObjectType::Blob, b"a".to_vec()).await.unwrap().to_string();
        store
            .update_ref("refs/heads/main", &sha, UpdateRefOptions { create: true, ..Default::default() })
            .await
            .unwrap();
        let value = store.get_ref("refs/heads/main").await.unwrap().unwrap();
        assert_eq!(value.target, sha);
    }

    #[tokio::test]
    async fn cas_mismatch_is_rejected() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (store, objects) = test_ref_store().await;
        let sha_a = objects.put_object(ObjectType::Blob, b"a".to_vec()).await.unwrap().to_string();
        let sha_b = objects.put_object(ObjectType::Blob, b"b".to_vec()).await.unwrap().to_string();
        let sha_c = "c".repeat(40);
        store.update_ref("refs/heads/main", &sha_a, UpdateRefOptions { create: true, ..Default::default() }).await.unwrap();
        let result = store
            .update_ref(
                "refs/heads/main",
                &sha_b,
                UpdateRefOptions { expected_old_sha: Some(sha_c), ..Default::default() },
            )
            .await;
        assert!(matches!(result, Err(CellError::Conflict(_))));
    }

    #[tokio::test]
    async fn update_without_create_on_missing_ref_fails() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (store, objects) = test_ref_store().await;
        let sha = objects.put_object(ObjectType::Blob, b"a".to_vec()).await.unwrap().to_string();
        let result = store.update_ref("refs/heads/missing", &sha, UpdateRefOptions::default()).await;
        assert!(matches!(result, Err(CellError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_ref_rejects_a_sha_never_put_into_the_object_store() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (store, _objects) = test_ref_store().await;
        let result = store
            .update_ref("refs/heads/main", &"a".repeat(40), UpdateRefOptions { create: true, ..Default::default() })
            .await;
        assert!(matches!(result, Err(CellError::Invalid(_))));
        assert!(store.get_ref("refs/heads/main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn symbolic_ref_resolves_to_target_sha() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (store, objects) = test_ref_store().await;
        let sha = objects.put_object(ObjectType::Blob, b"d".to_vec()).await.unwrap().to_string();
        store.update_ref("refs/heads/main", &sha, UpdateRefOptions { create: true, ..Default::default() }).await.unwrap();
        store.update_head("refs/heads/main", true).await.unwrap();
        let (name, resolved) = store.resolve_ref("HEAD").await.unwrap();
        assert_eq!(name, "refs/heads/main");
        assert_eq!(resolved, sha);
    }

    #[tokio::test]
    async fn lists_refs_lexicographically_by_prefix() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let (store, objects) = test_ref_store().await;
        let sha = objects.put_object(ObjectType::Blob, b"e".to_vec()).await.unwrap().to_string();
        for branch in ["refs/heads/b", "refs/heads/a", "refs/tags/v1"] {
            store.update_ref(branch, &sha, UpdateRefOptions { create: true, ..Default::default() }).await.unwrap();
        }
        let heads = store.list_refs(Some("refs/heads/")).await.unwrap();
        let names: Vec<_> = heads.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["refs/heads/a", "refs/heads/b"]);
    }
}
