//! Gatekeeper configuration

use serde::{Deserialize, Serialize};
use shoebox_domain::policy::MAX_RULES_PER_SET;
use shoebox_domain::LifecyclePolicy;

/// Configuration for rule-set validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Maximum number of rules in one rule set
    pub max_rules_per_set: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_rules_per_set: MAX_RULES_PER_SET,
        }
    }
}

impl ValidationConfig {
    /// Derive the validation limits from the lifecycle policy
    pub fn from_policy(policy: &LifecyclePolicy) -> Self {
        Self {
            max_rules_per_set: policy.max_rules_per_set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        assert_eq!(ValidationConfig::default().max_rules_per_set, 3);
    }

    #[test]
    fn test_from_policy() {
        let policy = LifecyclePolicy {
            max_rules_per_set: 5,
            ..Default::default()
        };
        assert_eq!(ValidationConfig::from_policy(&policy).max_rules_per_set, 5);
    }

    #[test]
    fn test_serde_roundtrip() {
        let json = serde_json::to_string(&ValidationConfig::default()).unwrap();
        let parsed: ValidationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_rules_per_set, 3);
    }
}
