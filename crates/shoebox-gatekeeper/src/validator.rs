//! Rule-set validation logic

use crate::{ValidationConfig, ValidationError};
use shoebox_domain::{Action, RuleScope, RuleSet, RuleSetId};
use std::collections::BTreeSet;
use std::fmt;

/// Reasons for rejection
#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// More rules than the configured cap
    TooManyRules {
        /// Number of rules submitted
        count: usize,
        /// Configured maximum
        max: usize,
    },

    /// A threshold is zero or negative
    NonPositiveThreshold {
        /// Index of the offending rule
        position: usize,
        /// Submitted threshold
        threshold: i64,
    },

    /// The same threshold appears more than once
    DuplicateThreshold {
        /// Repeated threshold
        threshold: i64,
    },

    /// A rule's threshold is below the one before it
    ThresholdsNotIncreasing {
        /// Index of the offending rule
        position: usize,
        /// Threshold of the preceding rule
        previous: i64,
        /// Threshold of the offending rule
        threshold: i64,
    },

    /// A Delete rule fires before a MoveToColdTier rule
    DeleteBeforeColdTier {
        /// Threshold of the Delete rule
        delete_threshold: i64,
        /// Threshold of the later MoveToColdTier rule
        cold_threshold: i64,
    },

    /// The owner already has a rule set for this scope
    DuplicateScope {
        /// Rule set already holding the scope
        existing_id: RuleSetId,
        /// The contested scope
        scope: RuleScope,
    },
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::TooManyRules { count, max } => {
                write!(f, "{} rules submitted, at most {} allowed", count, max)
            }
            RejectionReason::NonPositiveThreshold { position, threshold } => write!(
                f,
                "rule {} has non-positive threshold {} days",
                position, threshold
            ),
            RejectionReason::DuplicateThreshold { threshold } => {
                write!(f, "threshold {} days appears more than once", threshold)
            }
            RejectionReason::ThresholdsNotIncreasing {
                position,
                previous,
                threshold,
            } => write!(
                f,
                "rule {} threshold {} days is below the previous threshold {} days",
                position, threshold, previous
            ),
            RejectionReason::DeleteBeforeColdTier {
                delete_threshold,
                cold_threshold,
            } => write!(
                f,
                "delete at {} days precedes move to cold tier at {} days",
                delete_threshold, cold_threshold
            ),
            RejectionReason::DuplicateScope { existing_id, scope } => match scope {
                RuleScope::Global => {
                    write!(f, "owner already has a global rule set ({})", existing_id)
                }
                RuleScope::Album(album_id) => write!(
                    f,
                    "album {} already has a rule set ({})",
                    album_id, existing_id
                ),
            },
        }
    }
}

/// The Gatekeeper validates rule sets before they are stored or evaluated
#[derive(Debug, Clone)]
pub struct Gatekeeper {
    config: ValidationConfig,
}

impl Gatekeeper {
    /// Create a new Gatekeeper with the given configuration
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Create a Gatekeeper with default configuration
    pub fn default_config() -> Self {
        Self::new(ValidationConfig::default())
    }

    /// Validate a rule set before it is persisted
    ///
    /// `existing` holds the rule sets already stored for the owner; a set with
    /// the same id as `rule_set` is treated as the version being replaced.
    pub fn validate(&self, rule_set: &RuleSet, existing: &[RuleSet]) -> Result<(), ValidationError> {
        let mut reasons = self.structural_reasons(rule_set);

        if let Some(reason) = self.check_scope_conflict(rule_set, existing) {
            reasons.push(reason);
        }

        Self::finish(reasons)
    }

    /// Validate the shape of a single rule set, without looking at its siblings
    ///
    /// The scheduler re-runs this on stored rule sets before using them.
    pub fn validate_structure(&self, rule_set: &RuleSet) -> Result<(), ValidationError> {
        Self::finish(self.structural_reasons(rule_set))
    }

    fn finish(reasons: Vec<RejectionReason>) -> Result<(), ValidationError> {
        if reasons.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { reasons })
        }
    }

    fn structural_reasons(&self, rule_set: &RuleSet) -> Vec<RejectionReason> {
        let mut reasons = Vec::new();

        // 1. Size cap
        if rule_set.rules.len() > self.config.max_rules_per_set {
            reasons.push(RejectionReason::TooManyRules {
                count: rule_set.rules.len(),
                max: self.config.max_rules_per_set,
            });
        }

        // 2. Positive thresholds
        for (position, rule) in rule_set.rules.iter().enumerate() {
            if rule.age_threshold_days <= 0 {
                reasons.push(RejectionReason::NonPositiveThreshold {
                    position,
                    threshold: rule.age_threshold_days,
                });
            }
        }

        // 3. Duplicates, reported once per value
        let mut seen = BTreeSet::new();
        let mut duplicated = BTreeSet::new();
        for rule in &rule_set.rules {
            if !seen.insert(rule.age_threshold_days) {
                duplicated.insert(rule.age_threshold_days);
            }
        }
        reasons.extend(
            duplicated
                .into_iter()
                .map(|threshold| RejectionReason::DuplicateThreshold { threshold }),
        );

        // 4. Strictly increasing by position (equal neighbours are covered by 3)
        for (position, pair) in rule_set.rules.windows(2).enumerate() {
            let (previous, current) = (pair[0].age_threshold_days, pair[1].age_threshold_days);
            if current < previous {
                reasons.push(RejectionReason::ThresholdsNotIncreasing {
                    position: position + 1,
                    previous,
                    threshold: current,
                });
            }
        }

        // 5. Severity never decreases with threshold
        if let Some(reason) = self.check_severity_order(rule_set) {
            reasons.push(reason);
        }

        reasons
    }

    fn check_severity_order(&self, rule_set: &RuleSet) -> Option<RejectionReason> {
        let earliest_delete = rule_set
            .rules
            .iter()
            .filter(|r| r.action == Action::Delete)
            .map(|r| r.age_threshold_days)
            .min()?;
        let latest_cold = rule_set
            .rules
            .iter()
            .filter(|r| r.action == Action::MoveToColdTier)
            .map(|r| r.age_threshold_days)
            .max()?;

        (earliest_delete < latest_cold).then_some(RejectionReason::DeleteBeforeColdTier {
            delete_threshold: earliest_delete,
            cold_threshold: latest_cold,
        })
    }

    fn check_scope_conflict(&self, rule_set: &RuleSet, existing: &[RuleSet]) -> Option<RejectionReason> {
        existing
            .iter()
            .find(|other| {
                other.id != rule_set.id
                    && other.owner_id == rule_set.owner_id
                    && other.scope == rule_set.scope
            })
            .map(|other| RejectionReason::DuplicateScope {
                existing_id: other.id,
                scope: rule_set.scope,
            })
    }
}
