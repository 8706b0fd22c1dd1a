//! Unified error taxonomy for the RepoCell storage engine.
//!
//! One variant per error kind from the specification's error-handling design:
//! `NotFound`, `Conflict`, `Protected`, `Invalid`, `Malformed`, `Timeout`,
//! `Io`, `Cancelled`, `Internal`. Components return these directly; the HTTP
//! surface (`runtime::http`) maps them onto 4xx/5xx status codes.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CellError {
    /// Missing sha, missing ref, missing segment. Returned, not panicked on —
    /// callers decide what to do with an absence.
    #[error("not found: {0}")]
    NotFound(String),

    /// Ref CAS mismatch, create-over-existing, rename target exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A branch-protection rule rejected the mutation.
    #[error("protected: {0}")]
    Protected(String),

    /// Malformed sha, bad ref name, invalid start point, bad argument.
    #[error("invalid: {0}")]
    Invalid(String),

    /// Truncated tree bytes, bad pack magic, bad commit framing. Carries a
    /// byte offset where parsing gave up, when known.
    #[error("malformed at byte {offset}: {detail}")]
    Malformed { offset: usize, detail: String },

    /// A per-operation deadline (§5) was exceeded. Safe to retry for
    /// idempotent operations.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Durability failure: WAL flush, bulk-storage put/get, embedded SQL.
    #[error("io: {0}")]
    Io(String),

    /// Caller cancelled the operation; no state change occurred.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Invariant violation. Fatal for the current operation; the shard logs
    /// and continues serving other requests.
    #[error("internal: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CellError {
    fn from(e: std::io::Error) -> Self {
        CellError::Io(e.to_string())
    }
}

impl From<sea_orm::DbErr> for CellError {
    fn from(e: sea_orm::DbErr) -> Self {
        CellError::Io(format!("embedded sql: {e}"))
    }
}

impl CellError {
    pub fn malformed(offset: usize, detail: impl Into<String>) -> Self {
        CellError::Malformed {
            offset,
            detail: detail.into(),
        }
    }

    /// True for errors where the caller can safely retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CellError::Timeout(_) | CellError::Io(_))
    }
}
