//! Temporal tier assignment
//!
//! Entries age from hot through warm to cold; the archived tier is reached
//! only under emergency pressure, never by age alone. A recently accessed
//! entry is pulled back to hot when `promote_on_access` is set.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::entry::{Entry, Tier};

/// Compute the tier an entry should occupy at `now`.
///
/// Age arithmetic saturates at zero, so a non-monotonic clock never
/// demotes anything.
pub fn target_tier(entry: &Entry, config: &EngineConfig, now: i64) -> Tier {
    if config.promote_on_access && entry.idle_ms(now) < config.tiers.hot.max_age_ms {
        return Tier::Hot;
    }
    let age = entry.age_ms(now);
    if age < config.tiers.hot.max_age_ms {
        Tier::Hot
    } else if age < config.tiers.warm.max_age_ms {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

/// Counters reported by one `transition_tiers` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierTransitionResult {
    pub hot_to_warm: usize,
    pub warm_to_cold: usize,
    pub cold_to_archived: usize,
    pub promoted: usize,
    pub compressed: usize,
    pub compressions_skipped: usize,
    /// Reduction in effective tokens achieved by compression this pass
    pub tokens_saved: u64,
}

impl TierTransitionResult {
    /// True when the pass changed nothing.
    pub fn is_noop(&self) -> bool {
        self.hot_to_warm == 0
            && self.warm_to_cold == 0
            && self.cold_to_archived == 0
            && self.promoted == 0
            && self.compressed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryMetadata, EntryType};

    fn config_with_ages(hot: i64, warm: i64, promote: bool) -> EngineConfig {
        let mut config = EngineConfig::builder()
            .hot_tier(hot, 1.0)
            .warm_tier(warm, 0.5)
            .build();
        config.promote_on_access = promote;
        config
    }

    fn entry_created_at(at: i64) -> Entry {
        Entry::new("text".to_string(), EntryType::Other, 10, EntryMetadata::default(), at)
    }

    #[test]
    fn test_fresh_entry_is_hot() {
        let config = config_with_ages(100, 500, false);
        let entry = entry_created_at(0);
        assert_eq!(target_tier(&entry, &config, 50), Tier::Hot);
    }

    #[test]
    fn test_ages_into_warm_then_cold() {
        let config = config_with_ages(100, 500, false);
        let entry = entry_created_at(0);
        assert_eq!(target_tier(&entry, &config, 100), Tier::Warm);
        assert_eq!(target_tier(&entry, &config, 499), Tier::Warm);
        assert_eq!(target_tier(&entry, &config, 500), Tier::Cold);
    }

    #[test]
    fn test_never_archived_by_age() {
        let config = config_with_ages(100, 500, false);
        let entry = entry_created_at(0);
        assert_eq!(target_tier(&entry, &config, i64::MAX), Tier::Cold);
    }

    #[test]
    fn test_recent_access_promotes() {
        let config = config_with_ages(100, 500, true);
        let mut entry = entry_created_at(0);
        entry.mark_accessed(950);
        // Old by creation, fresh by access
        assert_eq!(target_tier(&entry, &config, 1_000), Tier::Hot);
    }

    #[test]
    fn test_promotion_disabled_ignores_access() {
        let config = config_with_ages(100, 500, false);
        let mut entry = entry_created_at(0);
        entry.mark_accessed(950);
        assert_eq!(target_tier(&entry, &config, 1_000), Tier::Cold);
    }

    #[test]
    fn test_clock_regression_keeps_hot() {
        let config = config_with_ages(100, 500, false);
        let entry = entry_created_at(10_000);
        // now earlier than created_at: age treated as 0
        assert_eq!(target_tier(&entry, &config, 5_000), Tier::Hot);
    }
}
