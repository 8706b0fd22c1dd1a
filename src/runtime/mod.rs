//! The single-writer coordinator (§4.7): boots schema migrations, owns
//! every component handle, and exposes the cell-lifecycle operations the
//! HTTP surface calls into.

pub mod http;
pub mod scheduler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use sea_orm::DatabaseConnection;

use crate::branch::BranchManager;
use crate::bulk_store::BulkStore;
use crate::capabilities::{Clock, GitHttpClient, RandomId};
use crate::codec::{Commit, Signature, SignatureType, Tree};
use crate::columnar::ColumnarExporter;
use crate::config::CellConfig;
use crate::errors::CellError;
use crate::hash::ObjectHash;
use crate::object_store::ObjectStore;
use crate::refstore::{RefStore, UpdateRefOptions};
use crate::wire::client;
use crate::wire::server::GitServer;

/// One logging guard so `tracing_subscriber` is installed at most once per
/// process, matching the teacher's `init_logger` idempotence.
static LOGGING_INSTALLED: std::sync::Once = std::sync::Once::new();

pub fn install_logging() {
    LOGGING_INSTALLED.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

#[derive(Debug, Clone)]
pub struct ForkRequest {
    pub to: String,
    pub branch: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CompactReport {
    pub demotable_hot_objects: u64,
    pub compactable_segments: u64,
}

pub struct CellRuntime {
    pub config: CellConfig,
    pub object_store: Arc<ObjectStore>,
    pub columnar: Arc<ColumnarExporter>,
    pub refs: Arc<RefStore>,
    pub branches: Arc<BranchManager>,
    pub git_server: Arc<GitServer>,
    bulk: Arc<dyn BulkStore>,
    clock: Arc<dyn Clock>,
    http_client: Arc<dyn GitHttpClient>,
    initialized: AtomicBool,
    started_at: Instant,
}

#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub object_count: usize,
    pub refs: Vec<String>,
}

fn validate_namespace(ns: &str) -> Result<(), CellError> {
    if ns.is_empty() || ns.contains('/') || ns.contains(char::is_whitespace) {
        return Err(CellError::Invalid(format!("INVALID_NAMESPACE: {ns}")));
    }
    Ok(())
}

impl CellRuntime {
    pub fn new(
        db: DatabaseConnection,
        bulk: Arc<dyn BulkStore>,
        config: CellConfig,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomId>,
        http_client: Arc<dyn GitHttpClient>,
    ) -> Self {
        install_logging();
        let object_store = Arc::new(ObjectStore::new(db.clone(), bulk.clone(), config.object_store.clone(), config.bulk_prefix.clone()));
        let refs = Arc::new(RefStore::new(db.clone(), object_store.clone()));
        let branches = Arc::new(BranchManager::new(refs.clone(), object_store.clone()));
        let columnar = Arc::new(ColumnarExporter::new(
            db.clone(),
            bulk.clone(),
            config.bulk_prefix.clone(),
            config.columnar.clone(),
            clock.clone(),
            random,
        ));
        let git_server = Arc::new(GitServer::new(object_store.clone(), refs.clone(), branches.clone()));

        CellRuntime {
            config,
            object_store,
            columnar,
            refs,
            branches,
            git_server,
            bulk,
            clock,
            http_client,
            initialized: AtomicBool::new(false),
            started_at: Instant::now(),
        }
    }

    /// §4.7 `initialize`: idempotent. Seeds an empty-tree initial commit and
    /// `refs/heads/main` the first time; a second call is a no-op.
    pub async fn initialize(&self, ns: &str, parent: Option<&str>) -> Result<(), CellError> {
        validate_namespace(ns)?;
        if self.refs.get_ref("refs/heads/main").await?.is_some() {
            self.initialized.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let empty_tree = Tree::from_entries(vec![])?;
        self.object_store.put_tree(&empty_tree).await?;

        let now = self.clock.now_millis() / 1000;
        let signature = Signature::new(SignatureType::Author, "repocell".to_string(), "repocell@localhost".to_string(), now, "+0000".to_string());
        let message = match parent {
            Some(parent_ns) => format!("fork of {parent_ns}"),
            None => "initial commit".to_string(),
        };
        let commit = Commit::new(signature.clone(), signature, empty_tree.id, vec![], &message);
        let commit_sha = self.object_store.put_commit(&commit).await?;

        self.refs
            .update_ref("refs/heads/main", &commit_sha.to_string(), UpdateRefOptions { create: true, ..Default::default() })
            .await?;
        self.refs.update_head("refs/heads/main", true).await?;
        self.branches.set_current_branch("main");

        self.columnar.recover().await?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// §4.7 `fork`: requires prior init. Actually provisioning a new cell is
    /// the shard-lifecycle controller's job (external, per §1 Non-goals);
    /// this records the request's intent only.
    pub async fn fork(&self, request: ForkRequest) -> Result<(), CellError> {
        if !self.is_initialized() {
            return Err(CellError::Invalid("cell not initialized".to_string()));
        }
        validate_namespace(&request.to)?;
        tracing::info!(to = %request.to, branch = ?request.branch, "fork requested; scheduler provisions the new cell");
        Ok(())
    }

    /// §4.7 `compact`: reporting-only, distinct from `ColumnarExporter`'s
    /// columnar compaction (§9 design note (a)).
    pub async fn compact(&self) -> Result<CompactReport, CellError> {
        let compactable_segments = if self.columnar.compaction_needed().await? {
            self.config.columnar.compaction_batch_size as u64
        } else {
            0
        };
        Ok(CompactReport {
            demotable_hot_objects: 0,
            compactable_segments,
        })
    }

    pub async fn invalidate_caches(&self) {
        self.object_store.invalidate_all_caches().await;
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn bulk(&self) -> Arc<dyn BulkStore> {
        self.bulk.clone()
    }

    pub async fn commit_exists(&self, sha: &str) -> Result<bool, CellError> {
        match sha.parse::<ObjectHash>() {
            Ok(hash) => self.object_store.has_object(&hash).await,
            Err(_) => Ok(false),
        }
    }

    /// §4.6 "Client side", §3 sync ingress: discovers `clone_url`'s refs,
    /// fetches everything this cell doesn't already have, ingests the pack,
    /// and fast-forwards local refs to match.
    pub async fn sync(&self, clone_url: &str) -> Result<SyncReport, CellError> {
        let base = clone_url.trim_end_matches('/');
        let advertisement = self.http_client.get(&format!("{base}/info/refs?service=git-upload-pack")).await?;
        let discovered =
            client::parse_ref_advertisement(&advertisement).map_err(|e| CellError::Invalid(e.to_string()))?;

        let zero = ObjectHash::zero_str(crate::hash::get_hash_kind());
        let remote_refs: Vec<(String, String)> =
            discovered.refs.into_iter().filter(|(name, _)| name != "capabilities^{}").collect();
        let wants: Vec<String> = {
            let mut seen = std::collections::HashSet::new();
            remote_refs
                .iter()
                .map(|(_, sha)| sha.clone())
                .filter(|sha| sha != &zero && seen.insert(sha.clone()))
                .collect()
        };

        if wants.is_empty() {
            return Ok(SyncReport { object_count: 0, refs: remote_refs.into_iter().map(|(name, _)| name).collect() });
        }

        let haves: Vec<String> = self.refs.list_refs(None).await?.into_iter().map(|r| r.target).collect();
        let fetch_request = client::build_fetch_request(&wants, &haves);
        let response = self.http_client.post(&format!("{base}/git-upload-pack"), "application/x-git-upload-pack-request", fetch_request).await?;
        let pack_bytes = client::split_negotiation_and_pack(&response).map_err(|e| CellError::Invalid(e.to_string()))?;

        let mut fetched = Vec::new();
        crate::codec::pack::pack_decode(&pack_bytes, |entry| {
            fetched.push((entry.obj_type, entry.data));
        })?;
        let object_count = fetched.len();
        self.object_store.put_objects(fetched).await?;

        for (name, sha) in &remote_refs {
            let exists = self.refs.get_ref(name).await?.is_some();
            self.refs.update_ref(name, sha, UpdateRefOptions { create: !exists, force: true, ..Default::default() }).await?;
        }

        Ok(SyncReport { object_count, refs: remote_refs.into_iter().map(|(name, _)| name).collect() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk_store::MemoryBulkStore;
    use crate::capabilities::{NoopGitHttpClient, SystemClock, UuidV4RandomId};

    async fn test_runtime() -> CellRuntime {
        let db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let bulk = Arc::new(MemoryBulkStore::new());
        CellRuntime::new(
            db,
            bulk,
            CellConfig::new("acme-repo"),
            Arc::new(SystemClock),
            Arc::new(UuidV4RandomId),
            Arc::new(NoopGitHttpClient),
        )
    }

    #[tokio::test]
    async fn initialize_seeds_main_and_is_idempotent() {
        let runtime = test_runtime().await;
        runtime.initialize("acme-repo", None).await.unwrap();
        let main = runtime.refs.get_ref("refs/heads/main").await.unwrap().unwrap();

        runtime.initialize("acme-repo", None).await.unwrap();
        let main_again = runtime.refs.get_ref("refs/heads/main").await.unwrap().unwrap();
        assert_eq!(main.target, main_again.target);
    }

    #[tokio::test]
    async fn initialize_rejects_invalid_namespace() {
        let runtime = test_runtime().await;
        let result = runtime.initialize("bad/ns", None).await;
        assert!(matches!(result, Err(CellError::Invalid(_))));
    }

    #[tokio::test]
    async fn fork_requires_prior_initialize() {
        let runtime = test_runtime().await;
        let result = runtime.fork(ForkRequest { to: "child".to_string(), branch: None }).await;
        assert!(result.is_err());
    }

    /// A `GitHttpClient` that talks directly to another cell's `GitServer`,
    /// skipping the network so `sync` can be exercised against real pkt-line
    /// and pack wire bytes.
    struct InProcessGitHttpClient {
        remote: Arc<crate::wire::server::GitServer>,
    }

    #[async_trait::async_trait]
    impl GitHttpClient for InProcessGitHttpClient {
        async fn get(&self, _url: &str) -> Result<Vec<u8>, CellError> {
            self.remote
                .info_refs(crate::wire::types::ServiceType::UploadPack)
                .await
                .map_err(|e| CellError::Invalid(e.to_string()))
        }

        async fn post(&self, _url: &str, _content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, CellError> {
            self.remote.upload_pack(&body).await.map_err(|e| CellError::Invalid(e.to_string()))
        }
    }

    #[tokio::test]
    async fn sync_ingests_objects_and_refs_from_a_remote_cell() {
        let remote = test_runtime().await;
        remote.initialize("remote-repo", None).await.unwrap();

        let local_db = crate::schema::connect_and_migrate("sqlite::memory:").await.unwrap();
        let local = CellRuntime::new(
            local_db,
            Arc::new(MemoryBulkStore::new()),
            CellConfig::new("acme-repo"),
            Arc::new(SystemClock),
            Arc::new(UuidV4RandomId),
            Arc::new(InProcessGitHttpClient { remote: remote.git_server.clone() }),
        );

        let report = local.sync("https://example.invalid/remote-repo.git").await.unwrap();
        assert!(report.object_count > 0);
        assert!(report.refs.iter().any(|r| r == "refs/heads/main"));

        let main = local.refs.get_ref("refs/heads/main").await.unwrap().unwrap();
        let remote_main = remote.refs.get_ref("refs/heads/main").await.unwrap().unwrap();
        assert_eq!(main.target, remote_main.target);
        assert!(local.commit_exists(&main.target).await.unwrap());
    }
}
