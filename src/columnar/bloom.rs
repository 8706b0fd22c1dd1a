//! Approximate SHA-membership filter for segments, persisted in the
//! `bloom_filter` table and rebuilt from the segment index on cold start
//! (§3, §4.3).

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_hashes: u32,
    pub item_count: u64,
}

impl BloomFilter {
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let expected_items = expected_items.max(1);
        let num_bits = (-(expected_items as f64) * false_positive_rate.ln() / (2f64.ln().powi(2)))
            .ceil()
            .max(64.0) as usize;
        let num_words = num_bits.div_ceil(64);
        let num_hashes = ((num_bits as f64 / expected_items as f64) * 2f64.ln())
            .round()
            .clamp(1.0, 16.0) as u32;
        BloomFilter {
            bits: vec![0u64; num_words],
            num_hashes,
            item_count: 0,
        }
    }

    fn indices(&self, item: &str) -> Vec<usize> {
        let num_bits = self.bits.len() * 64;
        let mut hasher1 = std::collections::hash_map::DefaultHasher::new();
        item.hash(&mut hasher1);
        let h1 = hasher1.finish();
        let mut hasher2 = std::collections::hash_map::DefaultHasher::new();
        (item, "salt").hash(&mut hasher2);
        let h2 = hasher2.finish();

        (0..self.num_hashes)
            .map(|i| (h1.wrapping_add((i as u64).wrapping_mul(h2)) as usize) % num_bits)
            .collect()
    }

    pub fn insert(&mut self, item: &str) {
        for index in self.indices(item) {
            self.bits[index / 64] |= 1 << (index % 64);
        }
        self.item_count += 1;
    }

    /// May return `true` for items never inserted; never returns `false`
    /// for an inserted item.
    pub fn might_contain(&self, item: &str) -> bool {
        self.indices(item)
            .into_iter()
            .all(|index| self.bits[index / 64] & (1 << (index % 64)) != 0)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        serde_json::from_slice(data).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inserted_items_are_always_found() {
        let mut filter = BloomFilter::new(100, 0.01);
        for sha in ["aaaa", "bbbb", "cccc"] {
            filter.insert(sha);
        }
        for sha in ["aaaa", "bbbb", "cccc"] {
            assert!(filter.might_contain(sha));
        }
    }

    #[test]
    fn round_trips_through_bytes() {
        let mut filter = BloomFilter::new(10, 0.01);
        filter.insert("sha-value");
        let bytes = filter.to_bytes();
        let restored = BloomFilter::from_bytes(&bytes).unwrap();
        assert!(restored.might_contain("sha-value"));
        assert_eq!(restored.item_count, 1);
    }
}
