//! Configuration for lifecycle operations
//!
//! Policy constants, retry budgets and the default quota. Every section has
//! serde defaults so a partial TOML table is enough.

use serde::{Deserialize, Serialize};
use shoebox_domain::policy::{
    COLD_COST_PERCENT, FROZEN_COST_PERCENT, MAX_RULES_PER_SET, REFREEZE_COOLDOWN_DAYS,
};
use shoebox_domain::LifecyclePolicy;
use std::time::Duration;

/// Configuration for the lifecycle engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifecycle policy constants
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Retry budgets for conflicts and storage calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Quota defaults
    #[serde(default)]
    pub quota: QuotaConfig,
}

/// Lifecycle policy constants
///
/// ```
/// use shoebox_engine::PolicyConfig;
///
/// let policy = PolicyConfig::default().to_policy();
/// assert_eq!(policy.max_rules_per_set, 3);
/// assert_eq!(policy.frozen_cost_percent, 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Maximum number of rules in one rule set
    /// Default: 3
    #[serde(default = "default_max_rules")]
    pub max_rules_per_set: usize,

    /// Quota weight of a frozen photo, in percent
    /// Default: 50 (freezing halves the cost)
    #[serde(default = "default_frozen_cost")]
    pub frozen_cost_percent: u64,

    /// Quota weight of a Cold-tier photo, in percent
    /// Default: 100 (Cold is a placement change, not a rebate)
    #[serde(default = "default_cold_cost")]
    pub cold_cost_percent: u64,

    /// Days after an unfreeze before the photo may be frozen again
    /// Default: 30
    #[serde(default = "default_cooldown_days")]
    pub refreeze_cooldown_days: u64,
}

fn default_max_rules() -> usize {
    MAX_RULES_PER_SET
}

fn default_frozen_cost() -> u64 {
    FROZEN_COST_PERCENT
}

fn default_cold_cost() -> u64 {
    COLD_COST_PERCENT
}

fn default_cooldown_days() -> u64 {
    REFREEZE_COOLDOWN_DAYS
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            max_rules_per_set: MAX_RULES_PER_SET,
            frozen_cost_percent: FROZEN_COST_PERCENT,
            cold_cost_percent: COLD_COST_PERCENT,
            refreeze_cooldown_days: REFREEZE_COOLDOWN_DAYS,
        }
    }
}

impl EngineConfig {
    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), String> {
        self.policy.validate()
    }
}

impl PolicyConfig {
    /// Reject a rule cap of zero and cost weights above 100%
    ///
    /// A weight above 100% would make freezing or cold storage raise the
    /// charge instead of lowering it.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_rules_per_set == 0 {
            return Err("policy.max_rules_per_set must be at least 1".to_string());
        }
        if self.frozen_cost_percent > 100 {
            return Err(format!(
                "policy.frozen_cost_percent must be between 0 and 100, got {}",
                self.frozen_cost_percent
            ));
        }
        if self.cold_cost_percent > 100 {
            return Err(format!(
                "policy.cold_cost_percent must be between 0 and 100, got {}",
                self.cold_cost_percent
            ));
        }
        Ok(())
    }

    /// Convert into the domain policy
    pub fn to_policy(&self) -> LifecyclePolicy {
        LifecyclePolicy {
            max_rules_per_set: self.max_rules_per_set,
            frozen_cost_percent: self.frozen_cost_percent,
            cold_cost_percent: self.cold_cost_percent,
            refreeze_cooldown_days: self.refreeze_cooldown_days,
        }
    }
}

/// Retry budgets
///
/// Backoff is exponential: `base × 2^(attempt - 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts at a version-guarded write before surfacing `Conflict`
    /// Default: 3
    #[serde(default = "default_conflict_attempts")]
    pub conflict_attempts: u32,

    /// Base backoff between conflict retries (milliseconds)
    /// Default: 25
    #[serde(default = "default_conflict_backoff_ms")]
    pub conflict_backoff_ms: u64,

    /// Attempts at a storage backend call before marking the photo pending
    /// Default: 3
    #[serde(default = "default_storage_attempts")]
    pub storage_attempts: u32,

    /// Base backoff between storage retries (milliseconds)
    /// Default: 100
    #[serde(default = "default_storage_backoff_ms")]
    pub storage_backoff_ms: u64,

    /// Timeout of a single storage call (milliseconds)
    /// Default: 5000
    #[serde(default = "default_storage_timeout_ms")]
    pub storage_timeout_ms: u64,
}

fn default_conflict_attempts() -> u32 {
    3
}

fn default_conflict_backoff_ms() -> u64 {
    25
}

fn default_storage_attempts() -> u32 {
    3
}

fn default_storage_backoff_ms() -> u64 {
    100
}

fn default_storage_timeout_ms() -> u64 {
    5000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            conflict_attempts: default_conflict_attempts(),
            conflict_backoff_ms: default_conflict_backoff_ms(),
            storage_attempts: default_storage_attempts(),
            storage_backoff_ms: default_storage_backoff_ms(),
            storage_timeout_ms: default_storage_timeout_ms(),
        }
    }
}

impl RetryConfig {
    /// Retry budget with no sleeping, for tests
    pub fn immediate() -> Self {
        Self {
            conflict_backoff_ms: 0,
            storage_backoff_ms: 0,
            ..Self::default()
        }
    }

    /// Delay after the given failed conflict attempt (1-based)
    pub fn conflict_backoff(&self, attempt: u32) -> Duration {
        exponential(self.conflict_backoff_ms, attempt)
    }

    /// Delay after the given failed storage attempt (1-based)
    pub fn storage_backoff(&self, attempt: u32) -> Duration {
        exponential(self.storage_backoff_ms, attempt)
    }

    /// Timeout of one storage call
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }
}

fn exponential(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.saturating_sub(1).min(16);
    Duration::from_millis(base_ms.saturating_mul(factor))
}

/// Quota defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Limit for owners without an explicit one, in bytes (0 = unlimited)
    /// Default: 0
    #[serde(default)]
    pub default_limit_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.policy.to_policy(), LifecyclePolicy::default());
        assert_eq!(config.retry.conflict_attempts, 3);
        assert_eq!(config.retry.storage_attempts, 3);
        assert_eq!(config.retry.storage_timeout(), Duration::from_secs(5));
        assert_eq!(config.quota.default_limit_bytes, 0);
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryConfig::default();
        assert_eq!(retry.storage_backoff(1), Duration::from_millis(100));
        assert_eq!(retry.storage_backoff(2), Duration::from_millis(200));
        assert_eq!(retry.storage_backoff(3), Duration::from_millis(400));
        assert_eq!(retry.conflict_backoff(1), Duration::from_millis(25));
        assert_eq!(retry.conflict_backoff(3), Duration::from_millis(100));
    }

    #[test]
    fn test_immediate_has_no_delay() {
        let retry = RetryConfig::immediate();
        assert_eq!(retry.storage_backoff(3), Duration::ZERO);
        assert_eq!(retry.conflict_backoff(3), Duration::ZERO);
        assert_eq!(retry.conflict_attempts, 3);
    }

    #[test]
    fn test_policy_bounds() {
        assert!(EngineConfig::default().validate().is_ok());

        let mut config = EngineConfig::default();
        config.policy.frozen_cost_percent = 200;
        assert!(config.validate().unwrap_err().contains("frozen_cost_percent"));

        let mut config = EngineConfig::default();
        config.policy.cold_cost_percent = 101;
        assert!(config.validate().unwrap_err().contains("cold_cost_percent"));

        let mut config = EngineConfig::default();
        config.policy.max_rules_per_set = 0;
        assert!(config.validate().is_err());

        config.policy.max_rules_per_set = 1;
        config.policy.frozen_cost_percent = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"policy": {"cold_cost_percent": 40}, "retry": {}}"#).unwrap();
        assert_eq!(config.policy.cold_cost_percent, 40);
        assert_eq!(config.policy.frozen_cost_percent, 50);
        assert_eq!(config.retry.storage_backoff_ms, 100);
    }
}
