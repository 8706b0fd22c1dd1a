//! Tier classification and promotion/demotion policy (§4.2).

use serde::{Deserialize, Serialize};

use crate::config::ObjectStoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    pub fn from_str(s: &str) -> Option<Tier> {
        match s {
            "hot" => Some(Tier::Hot),
            "warm" => Some(Tier::Warm),
            "cold" => Some(Tier::Cold),
            _ => None,
        }
    }

    /// One tier warmer, or `None` if already hot.
    pub fn warmer(self) -> Option<Tier> {
        match self {
            Tier::Cold => Some(Tier::Warm),
            Tier::Warm => Some(Tier::Hot),
            Tier::Hot => None,
        }
    }
}

/// Decide the landing tier for a freshly written object, given its size and
/// the hot tier's current occupancy.
pub fn landing_tier(config: &ObjectStoreConfig, size: u64, hot_bytes_in_use: u64) -> Tier {
    if size <= config.hot_object_max && hot_bytes_in_use + size <= config.hot_max {
        Tier::Hot
    } else {
        Tier::Warm
    }
}

/// Whether a read from `tier` with `access_count` accesses so far should
/// trigger promotion one tier warmer.
pub fn should_promote(config: &ObjectStoreConfig, tier: Tier, access_count: u32) -> bool {
    tier != Tier::Hot && access_count >= config.promotion_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_object_with_room_lands_hot() {
        let config = ObjectStoreConfig::default();
        assert_eq!(landing_tier(&config, 1024, 0), Tier::Hot);
    }

    #[test]
    fn oversized_object_lands_warm() {
        let config = ObjectStoreConfig::default();
        assert_eq!(landing_tier(&config, config.hot_object_max + 1, 0), Tier::Warm);
    }

    #[test]
    fn full_hot_tier_lands_warm() {
        let config = ObjectStoreConfig::default();
        assert_eq!(landing_tier(&config, 1024, config.hot_max), Tier::Warm);
    }

    #[test]
    fn promotion_threshold_gates_promotion() {
        let config = ObjectStoreConfig::default();
        assert!(!should_promote(&config, Tier::Warm, config.promotion_threshold - 1));
        assert!(should_promote(&config, Tier::Warm, config.promotion_threshold));
        assert!(!should_promote(&config, Tier::Hot, 100));
    }
}
