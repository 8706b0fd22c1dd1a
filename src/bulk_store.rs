//! `BulkStore`: the "R2-like" external collaborator that backs the warm and
//! cold object tiers, columnar segments, and sync ref pointers (§6 External
//! capabilities). Owned outside the cell; the cell only ever calls through
//! this trait, never assumes a concrete backend.

use async_trait::async_trait;

use crate::errors::CellError;

#[derive(Debug, Clone)]
pub struct BulkObject {
    pub key: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub cursor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListResult {
    pub objects: Vec<String>,
    pub truncated: bool,
    pub cursor: Option<String>,
}

#[async_trait]
pub trait BulkStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<BulkObject>, CellError>;
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), CellError>;
    async fn delete(&self, keys: &[String]) -> Result<(), CellError>;
    async fn list(&self, options: ListOptions) -> Result<ListResult, CellError>;
    async fn head(&self, key: &str) -> Result<bool, CellError>;
}

/// In-memory `BulkStore` used by tests and as a reference implementation;
/// production deployments supply their own (R2, S3, local disk, ...).
#[derive(Default)]
pub struct MemoryBulkStore {
    objects: dashmap::DashMap<String, Vec<u8>>,
}

impl MemoryBulkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BulkStore for MemoryBulkStore {
    async fn get(&self, key: &str) -> Result<Option<BulkObject>, CellError> {
        Ok(self.objects.get(key).map(|entry| BulkObject {
            key: key.to_string(),
            data: entry.clone(),
        }))
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), CellError> {
        self.objects.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), CellError> {
        for key in keys {
            self.objects.remove(key);
        }
        Ok(())
    }

    async fn list(&self, options: ListOptions) -> Result<ListResult, CellError> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| {
                options
                    .prefix
                    .as_ref()
                    .is_none_or(|prefix| key.starts_with(prefix.as_str()))
            })
            .collect();
        keys.sort();
        let limit = options.limit.unwrap_or(keys.len());
        let truncated = keys.len() > limit;
        keys.truncate(limit);
        Ok(ListResult {
            objects: keys,
            truncated,
            cursor: None,
        })
    }

    async fn head(&self, key: &str) -> Result<bool, CellError> {
        Ok(self.objects.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryBulkStore::new();
        store.put("a/b", b"data".to_vec()).await.unwrap();
        let got = store.get("a/b").await.unwrap().unwrap();
        assert_eq!(got.data, b"data");
        assert!(store.head("a/b").await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_keys() {
        let store = MemoryBulkStore::new();
        store.put("k", b"v".to_vec()).await.unwrap();
        store.delete(&["k".to_string()]).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let store = MemoryBulkStore::new();
        store.put("objects/aa/bb", b"1".to_vec()).await.unwrap();
        store.put("packs/p1.pack", b"2".to_vec()).await.unwrap();
        let result = store
            .list(ListOptions {
                prefix: Some("objects/".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.objects, vec!["objects/aa/bb".to_string()]);
    }
}
