//! Per-component configuration structs, mirroring the teacher's
//! `PackConfig`/`LfsConfig` style: small `Serialize + Deserialize` structs
//! with a hand-written `Default` carrying the spec's stated defaults.

use serde::{Deserialize, Serialize};

/// §4.2 tiering thresholds and promotion/demotion policy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ObjectStoreConfig {
    /// Objects larger than this never live in the hot tier.
    pub hot_object_max: u64,
    /// Total hot-tier byte budget across all objects.
    pub hot_max: u64,
    /// Consecutive accesses in a colder tier before promotion.
    pub promotion_threshold: u32,
    /// Hot entries idle longer than this are demoted on the maintenance pass.
    pub demotion_age_days: u32,
    /// Max entries held in the LRU read cache.
    pub cache_capacity: usize,
    /// Max bytes held in the LRU read cache.
    pub cache_max_bytes: u64,
    /// Emit read/write/hit-rate metrics.
    pub metrics_enabled: bool,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            hot_object_max: 1024 * 1024,
            hot_max: 32 * 1024 * 1024,
            promotion_threshold: 3,
            demotion_age_days: 7,
            cache_capacity: 4096,
            cache_max_bytes: 16 * 1024 * 1024,
            metrics_enabled: true,
        }
    }
}

/// §4.3 write-buffer and compaction back-off policy.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ColumnarConfig {
    /// Soft cap on the in-memory write buffer before `accept` starts blocking.
    pub buffer_soft_cap: usize,
    /// Number of recent small segments merged per compaction pass.
    pub compaction_batch_size: usize,
    /// Base back-off delay in seconds.
    pub retry_base_secs: u64,
    /// Back-off multiplier applied per failed attempt.
    pub retry_multiplier: f64,
    /// Consecutive failures tolerated before compaction is skipped.
    pub max_attempts: u32,
}

impl Default for ColumnarConfig {
    fn default() -> Self {
        Self {
            buffer_soft_cap: 2000,
            compaction_batch_size: 16,
            retry_base_secs: 10,
            retry_multiplier: 3.0,
            max_attempts: 3,
        }
    }
}

/// §5 per-call deadlines.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TimeoutConfig {
    pub clone_secs: u64,
    pub batch_flush_secs: u64,
    pub compaction_attempt_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            clone_secs: 60,
            batch_flush_secs: 10,
            compaction_attempt_secs: 30,
        }
    }
}

/// Aggregate configuration for one `CellRuntime`.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CellConfig {
    pub namespace: String,
    /// Key prefix this cell uses within the shared bulk store.
    pub bulk_prefix: String,
    pub object_store: ObjectStoreConfig,
    pub columnar: ColumnarConfig,
    pub timeouts: TimeoutConfig,
}

impl CellConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        Self {
            bulk_prefix: namespace.clone(),
            namespace,
            object_store: ObjectStoreConfig::default(),
            columnar: ColumnarConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}
