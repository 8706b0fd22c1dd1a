//! LRU read cache, sized by both entry count and total bytes (§4.2
//! "Cache semantics"). A pure read accelerator: eviction discards data that
//! still lives authoritatively in the hot rows, and the cache is never
//! consulted for membership decisions affecting correctness.

use lru_mem::LruCache;

use crate::hash::ObjectHash;

pub struct ObjectCache {
    inner: LruCache<String, Vec<u8>>,
    capacity_entries: usize,
}

impl ObjectCache {
    pub fn new(capacity_entries: usize, max_bytes: u64) -> Self {
        Self {
            inner: LruCache::new(max_bytes as usize),
            capacity_entries,
        }
    }

    fn key(sha: &ObjectHash) -> String {
        sha.to_string()
    }

    pub fn get(&mut self, sha: &ObjectHash) -> Option<Vec<u8>> {
        self.inner.get(&Self::key(sha)).cloned()
    }

    pub fn insert(&mut self, sha: &ObjectHash, data: Vec<u8>) {
        // lru-mem evicts by byte budget on its own; we additionally cap
        // entry count to bound pathological many-tiny-objects cases.
        while self.inner.len() >= self.capacity_entries {
            if self.inner.remove_lru().is_none() {
                break;
            }
        }
        let _ = self.inner.insert(Self::key(sha), data);
    }

    pub fn invalidate(&mut self, sha: &ObjectHash) {
        self.inner.remove(&Self::key(sha));
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len() == 0
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }
}
