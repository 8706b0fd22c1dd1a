//! External capabilities consumed by the core besides `BulkStore` (§6):
//! a working-tree filesystem used only by `sync`, an HTTP client for the
//! sync data flow's discover+fetch round trip, plus `Clock`/`RandomId`.

use std::io::Read;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::CellError;

#[async_trait]
pub trait FileSystemCapability: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, CellError>;
    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), CellError>;
    async fn read_dir(&self, path: &str) -> Result<Vec<String>, CellError>;
    async fn exists(&self, path: &str) -> Result<bool, CellError>;
    async fn mkdir(&self, path: &str) -> Result<(), CellError>;
    async fn rm(&self, path: &str) -> Result<(), CellError>;
}

/// `tokio::fs`-backed filesystem capability, used when `sync` materializes a
/// working-tree view locally.
pub struct TokioFileSystem {
    pub root: std::path::PathBuf,
}

impl TokioFileSystem {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> std::path::PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl FileSystemCapability for TokioFileSystem {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, CellError> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(CellError::from)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<(), CellError> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(CellError::from)?;
        }
        tokio::fs::write(full, data).await.map_err(CellError::from)
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<String>, CellError> {
        let mut entries = tokio::fs::read_dir(self.resolve(path))
            .await
            .map_err(CellError::from)?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(CellError::from)? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    async fn exists(&self, path: &str) -> Result<bool, CellError> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await.unwrap_or(false))
    }

    async fn mkdir(&self, path: &str) -> Result<(), CellError> {
        tokio::fs::create_dir_all(self.resolve(path))
            .await
            .map_err(CellError::from)
    }

    async fn rm(&self, path: &str) -> Result<(), CellError> {
        let full = self.resolve(path);
        if tokio::fs::metadata(&full)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            tokio::fs::remove_dir_all(full).await.map_err(CellError::from)
        } else {
            tokio::fs::remove_file(full).await.map_err(CellError::from)
        }
    }
}

/// HTTP client capability driving `sync`'s discover+clone round trip against
/// an external `clone_url` (§4.6 "Client side").
#[async_trait]
pub trait GitHttpClient: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>, CellError>;
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, CellError>;
}

/// `ureq`-backed client. `ureq` is blocking, so each call runs on the
/// blocking thread pool.
pub struct UreqGitHttpClient;

fn read_body(response: ureq::http::Response<ureq::Body>) -> Result<Vec<u8>, CellError> {
    let mut buf = Vec::new();
    response
        .into_body()
        .into_reader()
        .read_to_end(&mut buf)
        .map_err(CellError::from)?;
    Ok(buf)
}

#[async_trait]
impl GitHttpClient for UreqGitHttpClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, CellError> {
        let url = url.to_string();
        tokio::task::spawn_blocking(move || {
            let response = ureq::get(&url).call().map_err(|e| CellError::Io(e.to_string()))?;
            read_body(response)
        })
        .await
        .map_err(|e| CellError::Internal(e.to_string()))?
    }

    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<Vec<u8>, CellError> {
        let url = url.to_string();
        let content_type = content_type.to_string();
        tokio::task::spawn_blocking(move || {
            let response = ureq::post(&url)
                .header("Content-Type", &content_type)
                .send(&body)
                .map_err(|e| CellError::Io(e.to_string()))?;
            read_body(response)
        })
        .await
        .map_err(|e| CellError::Internal(e.to_string()))?
    }
}

/// `GitHttpClient` that never reaches the network: every remote looks like
/// an empty repository. Used by tests and by deployments that disable sync.
pub struct NoopGitHttpClient;

#[async_trait]
impl GitHttpClient for NoopGitHttpClient {
    async fn get(&self, _url: &str) -> Result<Vec<u8>, CellError> {
        Ok(b"0000".to_vec())
    }

    async fn post(&self, _url: &str, _content_type: &str, _body: Vec<u8>) -> Result<Vec<u8>, CellError> {
        Ok(b"0000".to_vec())
    }
}

/// Monotonic-enough wall clock, abstracted so components never call
/// `SystemTime::now()` directly.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Random identifier source, abstracted for deterministic tests.
pub trait RandomId: Send + Sync {
    fn new_id(&self) -> String;
}

pub struct UuidV4RandomId;

impl RandomId for UuidV4RandomId {
    fn new_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!(b >= a);
    }

    #[test]
    fn uuid_random_id_is_unique() {
        let source = UuidV4RandomId;
        assert_ne!(source.new_id(), source.new_id());
    }
}
