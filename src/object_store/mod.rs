//! Tiered content-addressed object store (§4.2): hot embedded-SQL rows,
//! warm loose blobs in bulk storage, cold packfiles, an LRU read cache, a
//! write-ahead log, and atomic batch writes.

pub mod cache;
pub mod tier;

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait};
use tokio::sync::Mutex;

use crate::bulk_store::BulkStore;
use crate::codec::{Blob, Commit, ObjectTrait, ObjectType, Tag, Tree};
use crate::config::ObjectStoreConfig;
use crate::errors::CellError;
use crate::hash::ObjectHash;
use crate::schema::{hot_objects, object_index, objects, sha_cache, wal};

use cache::ObjectCache;
use tier::Tier;

pub struct ObjectStore {
    db: DatabaseConnection,
    bulk: Arc<dyn BulkStore>,
    cache: Mutex<ObjectCache>,
    config: ObjectStoreConfig,
    prefix: String,
    access_counts: DashMap<String, u32>,
}

fn warm_key(prefix: &str, sha: &ObjectHash) -> String {
    let hex = sha.to_string();
    format!("{}/objects/{}/{}", prefix, &hex[0..2], &hex[2..])
}

impl ObjectStore {
    pub fn new(
        db: DatabaseConnection,
        bulk: Arc<dyn BulkStore>,
        config: ObjectStoreConfig,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            cache: Mutex::new(ObjectCache::new(config.cache_capacity, config.cache_max_bytes)),
            db,
            bulk,
            config,
            prefix: prefix.into(),
            access_counts: DashMap::new(),
        }
    }

    async fn hot_bytes_in_use(&self) -> Result<u64, CellError> {
        let rows = object_index::Entity::find()
            .filter(object_index::Column::Tier.eq(Tier::Hot.as_str()))
            .all(&self.db)
            .await?;
        Ok(rows.iter().map(|row| row.size as u64).sum())
    }

    /// §4.2 `putObject`: returns the sha; if it already exists, no write.
    pub async fn put_object(&self, object_type: ObjectType, payload: Vec<u8>) -> Result<ObjectHash, CellError> {
        let sha = ObjectHash::from_type_and_data(object_type, &payload);
        if self.has_object(&sha).await? {
            return Ok(sha);
        }

        let hot_bytes = self.hot_bytes_in_use().await?;
        let landing = tier::landing_tier(&self.config, payload.len() as u64, hot_bytes);

        let txn = self.db.begin().await?;
        self.write_wal(&txn, "put_object", &sha.to_string()).await?;
        self.write_object_row(&txn, &sha, object_type, &payload, landing)
            .await?;
        txn.commit().await?;

        if landing == Tier::Hot {
            let mut cache = self.cache.lock().await;
            cache.insert(&sha, payload);
        } else {
            self.bulk.put(&warm_key(&self.prefix, &sha), payload).await?;
        }

        Ok(sha)
    }

    /// §4.2 `putObjects`: one transaction, shas precomputed before it opens;
    /// rollback on any failure leaves no partial writes.
    pub async fn put_objects(&self, objects_in: Vec<(ObjectType, Vec<u8>)>) -> Result<Vec<ObjectHash>, CellError> {
        let mut shas = Vec::with_capacity(objects_in.len());
        let mut to_store = Vec::with_capacity(objects_in.len());
        for (object_type, payload) in &objects_in {
            let sha = ObjectHash::from_type_and_data(*object_type, payload);
            shas.push(sha);
            if !self.has_object(&sha).await? {
                to_store.push((sha, *object_type, payload.clone()));
            }
        }

        if to_store.is_empty() {
            return Ok(shas);
        }

        let hot_bytes_before = self.hot_bytes_in_use().await?;
        let mut running_hot_bytes = hot_bytes_before;
        let mut landings = Vec::with_capacity(to_store.len());
        for (_, _, payload) in &to_store {
            let landing = tier::landing_tier(&self.config, payload.len() as u64, running_hot_bytes);
            if landing == Tier::Hot {
                running_hot_bytes += payload.len() as u64;
            }
            landings.push(landing);
        }

        let txn = self.db.begin().await?;
        self.write_wal(&txn, "put_objects", &format!("{} objects", to_store.len()))
            .await?;
        for ((sha, object_type, payload), landing) in to_store.iter().zip(landings.iter()) {
            self.write_object_row(&txn, sha, *object_type, payload, *landing).await?;
        }
        txn.commit().await?;

        let mut cache = self.cache.lock().await;
        for ((sha, _, payload), landing) in to_store.into_iter().zip(landings.into_iter()) {
            if landing == Tier::Hot {
                cache.insert(&sha, payload);
            } else {
                drop(cache);
                self.bulk.put(&warm_key(&self.prefix, &sha), payload).await?;
                cache = self.cache.lock().await;
            }
        }

        Ok(shas)
    }

    async fn write_wal(&self, txn: &sea_orm::DatabaseTransaction, operation: &str, summary: &str) -> Result<(), CellError> {
        let row = wal::ActiveModel {
            operation: Set(operation.to_string()),
            payload: Set(summary.to_string()),
            created_at: Set(Utc::now()),
            flushed: Set(false),
            ..Default::default()
        };
        row.insert(txn).await?;
        Ok(())
    }

    async fn write_object_row(
        &self,
        txn: &sea_orm::DatabaseTransaction,
        sha: &ObjectHash,
        object_type: ObjectType,
        payload: &[u8],
        landing: Tier,
    ) -> Result<(), CellError> {
        let sha_hex = sha.to_string();
        let now = Utc::now();

        if landing == Tier::Hot {
            objects::ActiveModel {
                sha: Set(sha_hex.clone()),
                r#type: Set(object_type.to_string()),
                size: Set(payload.len() as i64),
                data: Set(payload.to_vec()),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;

            hot_objects::ActiveModel {
                sha: Set(sha_hex.clone()),
                r#type: Set(object_type.to_string()),
                data: Set(payload.to_vec()),
                size: Set(payload.len() as i64),
                accessed_at: Set(now),
                created_at: Set(now),
            }
            .insert(txn)
            .await?;
        }

        object_index::ActiveModel {
            sha: Set(sha_hex.clone()),
            tier: Set(landing.as_str().to_string()),
            pack_id: Set(None),
            offset: Set(None),
            size: Set(payload.len() as i64),
            r#type: Set(object_type.to_string()),
            updated_at: Set(now),
            chunked: Set(false),
            chunk_count: Set(None),
        }
        .insert(txn)
        .await?;

        sha_cache::ActiveModel {
            sha: Set(sha_hex),
            r#type: Set(object_type.to_string()),
            size: Set(payload.len() as i64),
            added_at: Set(now),
        }
        .insert(txn)
        .await?;

        Ok(())
    }

    /// §4.2 `getObject`: LRU → hot row → warm blob → cold pack frame.
    pub async fn get_object(&self, sha: &ObjectHash) -> Result<Option<Vec<u8>>, CellError> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(data) = cache.get(sha) {
                return Ok(Some(data));
            }
        }

        let sha_hex = sha.to_string();
        let index = object_index::Entity::find_by_id(sha_hex.clone()).one(&self.db).await?;
        let Some(index) = index else {
            return Ok(None);
        };
        let tier = Tier::from_str(&index.tier).unwrap_or(Tier::Warm);

        let data = match tier {
            Tier::Hot => {
                let row = hot_objects::Entity::find_by_id(sha_hex.clone()).one(&self.db).await?;
                let Some(row) = row else { return Ok(None) };
                let mut active: hot_objects::ActiveModel = row.clone().into();
                active.accessed_at = Set(Utc::now());
                active.update(&self.db).await?;
                row.data
            }
            Tier::Warm => {
                let key = warm_key(&self.prefix, sha);
                match self.bulk.get(&key).await? {
                    Some(obj) => obj.data,
                    None => return Ok(None),
                }
            }
            Tier::Cold => {
                let pack_id = index
                    .pack_id
                    .ok_or_else(|| CellError::Internal("cold object missing pack_id".into()))?;
                let key = format!("{}/packs/{}.pack", self.prefix, pack_id);
                let Some(pack) = self.bulk.get(&key).await? else {
                    return Ok(None);
                };
                let mut found = None;
                crate::codec::pack::pack_decode(&pack.data, |entry| {
                    if found.is_none() && entry.hash == *sha {
                        found = Some(entry.data.clone());
                    }
                })?;
                match found {
                    Some(data) => data,
                    None => return Ok(None),
                }
            }
        };

        self.note_access(sha, tier).await;
        let mut cache = self.cache.lock().await;
        cache.insert(sha, data.clone());
        Ok(Some(data))
    }

    async fn note_access(&self, sha: &ObjectHash, tier: Tier) {
        if tier == Tier::Hot {
            return;
        }
        let count = {
            let mut entry = self.access_counts.entry(sha.to_string()).or_insert(0);
            *entry += 1;
            *entry
        };
        if tier::should_promote(&self.config, tier, count) {
            if let Some(warmer) = tier.warmer() {
                let _ = self.promote(sha, warmer).await;
            }
        }
    }

    async fn promote(&self, sha: &ObjectHash, to: Tier) -> Result<(), CellError> {
        let Some(data) = self.get_object_bypassing_promotion(sha).await? else {
            return Ok(());
        };
        let sha_hex = sha.to_string();
        let now = Utc::now();
        let object_type_str = object_index::Entity::find_by_id(sha_hex.clone())
            .one(&self.db)
            .await?
            .map(|row| row.r#type)
            .unwrap_or_else(|| "blob".to_string());

        if to == Tier::Hot {
            objects::ActiveModel {
                sha: Set(sha_hex.clone()),
                r#type: Set(object_type_str.clone()),
                size: Set(data.len() as i64),
                data: Set(data.clone()),
                created_at: Set(now),
            }
            .insert(&self.db)
            .await?;
            hot_objects::ActiveModel {
                sha: Set(sha_hex.clone()),
                r#type: Set(object_type_str.clone()),
                size: Set(data.len() as i64),
                data: Set(data),
                accessed_at: Set(now),
                created_at: Set(now),
            }
            .insert(&self.db)
            .await?;
        }

        if let Some(row) = object_index::Entity::find_by_id(sha_hex.clone()).one(&self.db).await? {
            let mut index: object_index::ActiveModel = row.into();
            index.tier = Set(to.as_str().to_string());
            index.updated_at = Set(now);
            index.update(&self.db).await?;
        }

        self.access_counts.remove(&sha_hex);
        Ok(())
    }

    async fn get_object_bypassing_promotion(&self, sha: &ObjectHash) -> Result<Option<Vec<u8>>, CellError> {
        let sha_hex = sha.to_string();
        let Some(index) = object_index::Entity::find_by_id(sha_hex.clone()).one(&self.db).await? else {
            return Ok(None);
        };
        match Tier::from_str(&index.tier).unwrap_or(Tier::Warm) {
            Tier::Hot => Ok(hot_objects::Entity::find_by_id(sha_hex).one(&self.db).await?.map(|r| r.data)),
            Tier::Warm => Ok(self.bulk.get(&warm_key(&self.prefix, sha)).await?.map(|o| o.data)),
            Tier::Cold => Box::pin(self.get_object(sha)).await,
        }
    }

    /// Force-demote a hot/warm object to the warm tier, writing its bytes
    /// to bulk storage under the canonical warm key (testable property 4).
    pub async fn demote_to_warm(&self, sha: &ObjectHash) -> Result<(), CellError> {
        let sha_hex = sha.to_string();
        let Some(data) = self.get_object_bypassing_promotion(sha).await? else {
            return Err(CellError::NotFound(sha_hex));
        };
        self.bulk.put(&warm_key(&self.prefix, sha), data).await?;

        objects::Entity::delete_by_id(sha_hex.clone()).exec(&self.db).await?;
        hot_objects::Entity::delete_by_id(sha_hex.clone()).exec(&self.db).await?;
        if let Some(row) = object_index::Entity::find_by_id(sha_hex.clone()).one(&self.db).await? {
            let mut active: object_index::ActiveModel = row.into();
            active.tier = Set(Tier::Warm.as_str().to_string());
            active.updated_at = Set(Utc::now());
            active.update(&self.db).await?;
        }

        let mut cache = self.cache.lock().await;
        cache.invalidate(sha);
        Ok(())
    }

    /// Force-demote to the cold (packfile) tier; the caller has already
    /// written the pack and knows its id/offset.
    pub async fn demote_to_cold(&self, sha: &ObjectHash, pack_id: &str, offset: i64) -> Result<(), CellError> {
        let sha_hex = sha.to_string();
        objects::Entity::delete_by_id(sha_hex.clone()).exec(&self.db).await?;
        hot_objects::Entity::delete_by_id(sha_hex.clone()).exec(&self.db).await?;
        self.bulk.delete(&[warm_key(&self.prefix, sha)]).await?;

        if let Some(row) = object_index::Entity::find_by_id(sha_hex.clone()).one(&self.db).await? {
            let mut active: object_index::ActiveModel = row.into();
            active.tier = Set(Tier::Cold.as_str().to_string());
            active.pack_id = Set(Some(pack_id.to_string()));
            active.offset = Set(Some(offset));
            active.updated_at = Set(Utc::now());
            active.update(&self.db).await?;
        }

        let mut cache = self.cache.lock().await;
        cache.invalidate(sha);
        Ok(())
    }

    /// §4.2 `getObjects`: results returned in original order, `None` where missing.
    pub async fn get_objects(&self, shas: &[ObjectHash]) -> Result<Vec<Option<Vec<u8>>>, CellError> {
        let mut out = Vec::with_capacity(shas.len());
        for sha in shas {
            out.push(self.get_object(sha).await?);
        }
        Ok(out)
    }

    /// §4.7 `CellRuntime::invalidateCaches`: drops the read cache wholesale.
    pub async fn invalidate_all_caches(&self) {
        self.cache.lock().await.clear();
    }

    /// §4.2 `hasObject`: read cache, then `sha_cache` fast path, then the
    /// authoritative index.
    pub async fn has_object(&self, sha: &ObjectHash) -> Result<bool, CellError> {
        {
            let mut cache = self.cache.lock().await;
            if cache.get(sha).is_some() {
                return Ok(true);
            }
        }
        let sha_hex = sha.to_string();
        if sha_cache::Entity::find_by_id(sha_hex.clone()).one(&self.db).await?.is_some() {
            return Ok(true);
        }
        let found = object_index::Entity::find_by_id(sha_hex).one(&self.db).await?;
        Ok(found.is_some())
    }

    /// §4.2 `deleteObject`: removes from hot, warm, index, cache; WAL-logged.
    pub async fn delete_object(&self, sha: &ObjectHash) -> Result<bool, CellError> {
        let sha_hex = sha.to_string();
        let existed = self.has_object(sha).await?;
        if !existed {
            return Ok(false);
        }

        let txn = self.db.begin().await?;
        self.write_wal(&txn, "delete_object", &sha_hex).await?;
        objects::Entity::delete_by_id(sha_hex.clone()).exec(&txn).await?;
        hot_objects::Entity::delete_by_id(sha_hex.clone()).exec(&txn).await?;
        object_index::Entity::delete_by_id(sha_hex.clone()).exec(&txn).await?;
        sha_cache::Entity::delete_by_id(sha_hex.clone()).exec(&txn).await?;
        txn.commit().await?;

        self.bulk.delete(&[warm_key(&self.prefix, sha)]).await?;
        let mut cache = self.cache.lock().await;
        cache.invalidate(sha);
        Ok(true)
    }

    /// §4.2 `verifyObject`: bypass cache, re-hash stored bytes.
    pub async fn verify_object(&self, sha: &ObjectHash) -> Result<bool, CellError> {
        let Some(data) = self.get_object_bypassing_promotion(sha).await? else {
            return Ok(false);
        };
        let index = object_index::Entity::find_by_id(sha.to_string()).one(&self.db).await?;
        let Some(index) = index else { return Ok(false) };
        let Some(object_type) = ObjectType::from_bytes(index.r#type.as_bytes()).ok() else {
            return Ok(false);
        };
        let recomputed = ObjectHash::from_type_and_data(object_type, &data);
        Ok(recomputed == *sha)
    }

    pub async fn put_tree(&self, tree: &Tree) -> Result<ObjectHash, CellError> {
        self.put_object(ObjectType::Tree, tree.to_data()?).await
    }

    pub async fn put_commit(&self, commit: &Commit) -> Result<ObjectHash, CellError> {
        self.put_object(ObjectType::Commit, commit.to_data()?).await
    }

    pub async fn put_tag(&self, tag: &Tag) -> Result<ObjectHash, CellError> {
        self.put_object(ObjectType::Tag, tag.to_data()?).await
    }

    pub async fn get_blob(&self, sha: &ObjectHash) -> Result<Option<Blob>, CellError> {
        match self.get_object(sha).await? {
            Some(data) => Ok(Some(Blob::from_bytes(&data, *sha)?)),
            None => Ok(None),
        }
    }

    pub async fn get_tree(&self, sha: &ObjectHash) -> Result<Option<Tree>, CellError> {
        match self.get_object(sha).await? {
            Some(data) => Ok(Some(Tree::from_bytes(&data, *sha)?)),
            None => Ok(None),
        }
    }

    pub async fn get_commit(&self, sha: &ObjectHash) -> Result<Option<Commit>, CellError> {
        match self.get_object(sha).await? {
            Some(data) => Ok(Some(Commit::from_bytes(&data, *sha)?)),
            None => Ok(None),
        }
    }

    pub async fn get_tag(&self, sha: &ObjectHash) -> Result<Option<Tag>, CellError> {
        match self.get_object(sha).await? {
            Some(data) => Ok(Some(Tag::from_bytes(&data, *sha)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::hash::{HashKind, set_hash_kind_for_test};

    async fn test_store() -> ObjectStore {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let bulk = Arc::new(MemoryBulkStore::new());
        ObjectStore::new(db, bulk, ObjectStoreConfig::default(), "test")
    }

    #[tokio::test]
    async fn put_then_get_blob_round_trips() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let store = test_store().await;
        let sha = store.put_object(ObjectType::Blob, b"hello\n".to_vec()).await.unwrap();
        assert_eq!(sha.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");
        let got = store.get_object(&sha).await.unwrap().unwrap();
        assert_eq!(got, b"hello\n".to_vec());
        assert!(store.verify_object(&sha).await.unwrap());
    }

    #[tokio::test]
    async fn put_object_twice_is_idempotent() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let store = test_store().await;
        let sha1 = store.put_object(ObjectType::Blob, b"same".to_vec()).await.unwrap();
        let sha2 = store.put_object(ObjectType::Blob, b"same".to_vec()).await.unwrap();
        assert_eq!(sha1, sha2);
    }

    #[tokio::test]
    async fn missing_object_returns_none_not_error() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let store = test_store().await;
        let sha = ObjectHash::from_type_and_data(ObjectType::Blob, b"never written");
        assert_eq!(store.get_object(&sha).await.unwrap(), None);
        assert!(!store.has_object(&sha).await.unwrap());
    }

    #[tokio::test]
    async fn delete_object_reports_prior_existence() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let store = test_store().await;
        let sha = store.put_object(ObjectType::Blob, b"to delete".to_vec()).await.unwrap();
        assert!(store.delete_object(&sha).await.unwrap());
        assert!(!store.delete_object(&sha).await.unwrap());
        assert_eq!(store.get_object(&sha).await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_objects_batch_returns_all_shas_in_order() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let store = test_store().await;
        let shas = store
            .put_objects(vec![
                (ObjectType::Blob, b"one".to_vec()),
                (ObjectType::Blob, b"two".to_vec()),
            ])
            .await
            .unwrap();
        assert_eq!(shas.len(), 2);
        for sha in &shas {
            assert!(store.has_object(sha).await.unwrap());
        }
    }

    #[tokio::test]
    async fn demote_to_warm_then_get_returns_same_bytes() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let store = test_store().await;
        let sha = store.put_object(ObjectType::Blob, b"tiered".to_vec()).await.unwrap();
        store.demote_to_warm(&sha).await.unwrap();
        let got = store.get_object(&sha).await.unwrap().unwrap();
        assert_eq!(got, b"tiered".to_vec());
    }
}
