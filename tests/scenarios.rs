//! End-to-end scenario tests (S1-S6) exercising the public crate surface
//! against a real in-memory `sea-orm` database and an in-memory `BulkStore`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use repocell_core::bulk_store::{BulkObject, BulkStore, ListOptions, ListResult, MemoryBulkStore};
use repocell_core::capabilities::{NoopGitHttpClient, SystemClock, UuidV4RandomId};
use repocell_core::codec::{ObjectType, Tree, TreeEntry, TreeEntryMode};
use repocell_core::columnar::ColumnarExporter;
use repocell_core::columnar::journal;
use repocell_core::config::{CellConfig, ColumnarConfig, ObjectStoreConfig};
use repocell_core::errors::CellError;
use repocell_core::hash::{HashKind, ObjectHash, set_hash_kind_for_test};
use repocell_core::object_store::ObjectStore;
use repocell_core::refstore::{RefStore, UpdateRefOptions};
use repocell_core::runtime::CellRuntime;
use repocell_core::schema::{branch_protection, connect_and_migrate};
use sea_orm::ActiveModelTrait;

async fn object_store() -> ObjectStore {
    let db = connect_and_migrate("sqlite::memory:").await.unwrap();
    let bulk = Arc::new(MemoryBulkStore::new());
    ObjectStore::new(db, bulk, ObjectStoreConfig::default(), "acme-repo")
}

async fn ref_store() -> (RefStore, Arc<ObjectStore>) {
    let db = connect_and_migrate("sqlite::memory:").await.unwrap();
    let bulk = Arc::new(MemoryBulkStore::new());
    let store = Arc::new(ObjectStore::new(db.clone(), bulk, ObjectStoreConfig::default(), "acme-repo"));
    (RefStore::new(db, store.clone()), store)
}

// S1 - Put/Get blob.
#[tokio::test]
async fn s1_put_get_blob() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let store = object_store().await;

    let sha = store.put_object(ObjectType::Blob, b"hello\n".to_vec()).await.unwrap();
    assert_eq!(sha.to_string(), "ce013625030ba8dba906f756967f9e9ca394464a");

    let payload = store.get_object(&sha).await.unwrap().unwrap();
    assert_eq!(payload, b"hello\n");
    assert!(store.verify_object(&sha).await.unwrap());
}

// S2 - Tree with two entries, order-independent.
#[tokio::test]
async fn s2_tree_with_two_entries_is_order_independent() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let sha_a = ObjectHash::from_type_and_data(ObjectType::Blob, b"a");
    let sha_b = ObjectHash::from_type_and_data(ObjectType::Blob, b"b");

    let forward = Tree::from_entries(vec![
        TreeEntry { mode: TreeEntryMode::Blob, name: "a".to_string(), id: sha_a },
        TreeEntry { mode: TreeEntryMode::Blob, name: "b".to_string(), id: sha_b },
    ])
    .unwrap();
    let reverse = Tree::from_entries(vec![
        TreeEntry { mode: TreeEntryMode::Blob, name: "b".to_string(), id: sha_b },
        TreeEntry { mode: TreeEntryMode::Blob, name: "a".to_string(), id: sha_a },
    ])
    .unwrap();

    assert_eq!(forward.id, reverse.id);
    assert_eq!(forward.tree_entries[0].name, "a");
    assert_eq!(forward.tree_entries[1].name, "b");
}

// S3 - Ref CAS conflict.
#[tokio::test]
async fn s3_ref_cas_conflict() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (refs, store) = ref_store().await;
    let sha_x = store.put_object(ObjectType::Blob, b"x".to_vec()).await.unwrap().to_string();
    let sha_y = store.put_object(ObjectType::Blob, b"y".to_vec()).await.unwrap().to_string();
    let sha_z = "c".repeat(40);

    refs.update_ref("refs/heads/main", &sha_x, UpdateRefOptions { create: true, ..Default::default() })
        .await
        .unwrap();

    let result = refs
        .update_ref(
            "refs/heads/main",
            &sha_y,
            UpdateRefOptions { expected_old_sha: Some(sha_z), ..Default::default() },
        )
        .await;
    assert!(matches!(result, Err(CellError::Conflict(_))));

    let current = refs.get_ref("refs/heads/main").await.unwrap().unwrap();
    assert_eq!(current.target, sha_x);
}

// S4 - Force-push protected.
#[tokio::test]
async fn s4_force_push_protected() {
    let _guard = set_hash_kind_for_test(HashKind::Sha1);
    let (refs, store) = ref_store().await;

    // Base commit X with no parents.
    let tree = Tree::from_entries(vec![]).unwrap();
    store.put_tree(&tree).await.unwrap();
    let sig = repocell_core::codec::Signature::new(
        repocell_core::codec::SignatureType::Author,
        "test".to_string(),
        "test@example.com".to_string(),
        0,
        "+0000".to_string(),
    );
    let commit_x = repocell_core::codec::Commit::new(sig.clone(), sig.clone(), tree.id, vec![], "x");
    let sha_x = store.put_commit(&commit_x).await.unwrap();

    // Y: unrelated commit, not a descendant of X.
    let commit_y = repocell_core::codec::Commit::new(sig.clone(), sig.clone(), tree.id, vec![], "y unrelated");
    let sha_y = store.put_commit(&commit_y).await.unwrap();

    // Z: a real descendant of X.
    let commit_z = repocell_core::codec::Commit::new(sig.clone(), sig, tree.id, vec![sha_x], "z descends from x");
    let sha_z = store.put_commit(&commit_z).await.unwrap();

    refs.update_ref("refs/heads/main", &sha_x.to_string(), UpdateRefOptions { create: true, ..Default::default() })
        .await
        .unwrap();

    let rule = branch_protection::ActiveModel {
        pattern: sea_orm::Set("refs/heads/main".to_string()),
        required_reviews: sea_orm::Set(0),
        prevent_force_push: sea_orm::Set(true),
        prevent_deletion: sea_orm::Set(false),
        enabled: sea_orm::Set(true),
        updated_at: sea_orm::Set(chrono::Utc::now()),
        ..Default::default()
    };
    rule.insert(refs.db()).await.unwrap();

    let rejected = refs.update_ref("refs/heads/main", &sha_y.to_string(), UpdateRefOptions::default()).await;
    assert!(matches!(rejected, Err(CellError::Protected(_))));

    refs.update_ref("refs/heads/main", &sha_z.to_string(), UpdateRefOptions::default())
        .await
        .unwrap();
    let current = refs.get_ref("refs/heads/main").await.unwrap().unwrap();
    assert_eq!(current.target, sha_z.to_string());
}

// S5 - Sync against an empty remote reports zero objects, no segment written.
#[tokio::test]
async fn s5_sync_empty_remote_reports_nothing() {
    let db = connect_and_migrate("sqlite::memory:").await.unwrap();
    let bulk = Arc::new(MemoryBulkStore::new());
    let runtime = CellRuntime::new(
        db,
        bulk,
        CellConfig::new("acme-repo"),
        Arc::new(SystemClock),
        Arc::new(UuidV4RandomId),
        Arc::new(NoopGitHttpClient),
    );

    let report = runtime.sync("https://example.invalid/acme-repo.git").await.unwrap();
    assert_eq!(report.object_count, 0);
    assert!(report.refs.is_empty());

    let refs = runtime.refs.list_refs(None).await.unwrap();
    assert!(refs.is_empty());
    assert!(!runtime.columnar.compaction_needed().await.unwrap());
}

/// Wraps `MemoryBulkStore`, failing the first `fail_count` calls to `put`.
struct FailingBulkStore {
    inner: MemoryBulkStore,
    remaining_failures: AtomicUsize,
}

impl FailingBulkStore {
    fn new(fail_count: usize) -> Self {
        Self { inner: MemoryBulkStore::new(), remaining_failures: AtomicUsize::new(fail_count) }
    }
}

#[async_trait]
impl BulkStore for FailingBulkStore {
    async fn get(&self, key: &str) -> Result<Option<BulkObject>, CellError> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), CellError> {
        if self.remaining_failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| if n > 0 { Some(n - 1) } else { None }).is_ok() {
            return Err(CellError::Internal("simulated bulk-storage put failure".to_string()));
        }
        self.inner.put(key, bytes).await
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CellError> {
        self.inner.delete(keys).await
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult, CellError> {
        self.inner.list(options).await
    }

    async fn head(&self, key: &str) -> Result<bool, CellError> {
        self.inner.head(key).await
    }
}

// S6 - Compaction retry: three consecutive failures trip the max-attempts
// bound; a fourth attempt is skipped; an explicit retry reset lets the next
// attempt through.
#[tokio::test]
async fn s6_compaction_retry_bound_and_reset() {
    let db = connect_and_migrate("sqlite::memory:").await.unwrap();
    let failing = Arc::new(FailingBulkStore::new(0));
    let bulk: Arc<dyn BulkStore> = failing.clone();
    let config = ColumnarConfig { compaction_batch_size: 2, ..Default::default() };
    let exporter = ColumnarExporter::new(db.clone(), bulk, "acme-repo", config, Arc::new(SystemClock), Arc::new(UuidV4RandomId));

    exporter.accept("sha-a", "blob", b"a".to_vec()).await.unwrap();
    exporter.flush().await.unwrap();
    exporter.accept("sha-b", "blob", b"b".to_vec()).await.unwrap();
    exporter.flush().await.unwrap();
    assert!(exporter.compaction_needed().await.unwrap());

    // Only the merge target's writes fail; the segments above are already down.
    failing.remaining_failures.store(3, Ordering::SeqCst);

    // Attempts 1-3 fail against the still-failing bulk store.
    exporter.run_compaction_if_needed().await.unwrap();
    assert_eq!(journal::current_attempt_count(&db).await.unwrap(), 1);
    exporter.run_compaction_if_needed().await.unwrap();
    assert_eq!(journal::current_attempt_count(&db).await.unwrap(), 2);
    exporter.run_compaction_if_needed().await.unwrap();
    assert_eq!(journal::current_attempt_count(&db).await.unwrap(), 3);

    // The fourth attempt is skipped outright: no new failure recorded.
    exporter.run_compaction_if_needed().await.unwrap();
    assert_eq!(journal::current_attempt_count(&db).await.unwrap(), 3);
    assert!(exporter.compaction_needed().await.unwrap());

    // An explicit `scheduleCompaction()` resets the counter; the bulk store
    // has stopped failing by now, so the next attempt succeeds.
    journal::clear_retries(&db).await.unwrap();
    exporter.run_compaction_if_needed().await.unwrap();
    assert_eq!(journal::current_attempt_count(&db).await.unwrap(), 0);
    assert!(!exporter.compaction_needed().await.unwrap());
}
