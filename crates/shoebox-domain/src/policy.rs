//! Lifecycle policy constants
//!
//! The rule cap, the freeze weight and the re-freeze cooldown are requirements
//! of the product, but they are still configuration: deployments tune them
//! through the engine configuration, which converts into this struct.

/// Seconds in one day, the unit of rule thresholds and the cooldown
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Maximum number of rules in one rule set (default: 3)
pub const MAX_RULES_PER_SET: usize = 3;

/// Share of a frozen photo's size charged to the quota, in percent (default: 50)
pub const FROZEN_COST_PERCENT: u64 = 50;

/// Share of a Cold-tier photo's size charged to the quota, in percent (default: 100)
pub const COLD_COST_PERCENT: u64 = 100;

/// Days that must pass after an unfreeze before the photo can be frozen again
pub const REFREEZE_COOLDOWN_DAYS: u64 = 30;

/// Largest accepted original-plus-thumbnail size, in bytes
///
/// Sizes and ledger deltas are stored as signed 64-bit integers.
pub const MAX_PHOTO_BYTES: u64 = i64::MAX as u64;

/// Tunable lifecycle constants shared by the validator, ledger and freeze manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecyclePolicy {
    /// Maximum number of rules in one rule set
    pub max_rules_per_set: usize,
    /// Quota weight of a frozen photo, in percent of its full size
    pub frozen_cost_percent: u64,
    /// Quota weight of a Cold-tier photo, in percent of its full size
    pub cold_cost_percent: u64,
    /// Re-freeze cooldown after an unfreeze, in days
    pub refreeze_cooldown_days: u64,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            max_rules_per_set: MAX_RULES_PER_SET,
            frozen_cost_percent: FROZEN_COST_PERCENT,
            cold_cost_percent: COLD_COST_PERCENT,
            refreeze_cooldown_days: REFREEZE_COOLDOWN_DAYS,
        }
    }
}

impl LifecyclePolicy {
    /// Re-freeze cooldown in seconds
    pub fn refreeze_cooldown_secs(&self) -> u64 {
        self.refreeze_cooldown_days * SECONDS_PER_DAY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = LifecyclePolicy::default();
        assert_eq!(policy.max_rules_per_set, 3);
        assert_eq!(policy.frozen_cost_percent, 50);
        assert_eq!(policy.cold_cost_percent, 100);
        assert_eq!(policy.refreeze_cooldown_secs(), 30 * 86_400);
    }
}
