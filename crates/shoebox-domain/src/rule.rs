//! Rule module - age-triggered lifecycle rules and the sets that scope them

use crate::{AlbumId, OwnerId, RuleId, RuleSetId, StorageTier};

/// What a rule does once a photo reaches its age threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Move the photo to the Cold tier
    MoveToColdTier,
    /// Delete the photo
    Delete,
}

impl Action {
    /// Ordering used by the validator: Delete is more severe than MoveToColdTier
    pub fn severity(&self) -> u8 {
        match self {
            Action::MoveToColdTier => 1,
            Action::Delete => 2,
        }
    }

    /// Get the action name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::MoveToColdTier => "move_to_cold_tier",
            Action::Delete => "delete",
        }
    }

    /// Parse an action from a string (internal use)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "move_to_cold_tier" | "cold" => Some(Action::MoveToColdTier),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }
}

/// The action a photo is due at an evaluation instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GoverningAction {
    /// No rule applies yet
    None,
    /// Move to the Cold tier
    MoveToColdTier,
    /// Delete
    Delete,
}

impl GoverningAction {
    /// Tier the photo should end up in, if the action moves it
    pub fn target_tier(&self) -> Option<StorageTier> {
        match self {
            GoverningAction::None => None,
            GoverningAction::MoveToColdTier => Some(StorageTier::Cold),
            GoverningAction::Delete => Some(StorageTier::Deleted),
        }
    }

    /// Get the action name as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            GoverningAction::None => "none",
            GoverningAction::MoveToColdTier => Action::MoveToColdTier.as_str(),
            GoverningAction::Delete => Action::Delete.as_str(),
        }
    }
}

impl From<Action> for GoverningAction {
    fn from(action: Action) -> Self {
        match action {
            Action::MoveToColdTier => GoverningAction::MoveToColdTier,
            Action::Delete => GoverningAction::Delete,
        }
    }
}

/// A single age-triggered rule
///
/// The threshold is kept signed so that malformed input reaches the validator
/// intact and is rejected there instead of being clamped on the way in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Unique identifier (recorded in audit events)
    pub id: RuleId,
    /// Minimum photo age, in whole days, at which the rule fires
    pub age_threshold_days: i64,
    /// What happens when it fires
    pub action: Action,
}

impl Rule {
    /// Create a rule with a fresh id
    pub fn new(age_threshold_days: i64, action: Action) -> Self {
        Self {
            id: RuleId::new(),
            age_threshold_days,
            action,
        }
    }
}

/// Which photos a rule set governs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleScope {
    /// Every photo of the owner not governed by an album set
    Global,
    /// Photos contained in one album
    Album(AlbumId),
}

impl RuleScope {
    /// Album this scope is attached to, if any
    pub fn album_id(&self) -> Option<AlbumId> {
        match self {
            RuleScope::Global => None,
            RuleScope::Album(id) => Some(*id),
        }
    }
}

/// Ordered, size-bounded collection of rules for one scope of one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    /// Unique identifier
    pub id: RuleSetId,
    /// Owner of the set
    pub owner_id: OwnerId,
    /// Global or album scope
    pub scope: RuleScope,
    /// Rules ordered by strictly increasing threshold
    pub rules: Vec<Rule>,
}

impl RuleSet {
    /// Create a rule set with a fresh id
    pub fn new(owner_id: OwnerId, scope: RuleScope, rules: Vec<Rule>) -> Self {
        Self {
            id: RuleSetId::new(),
            owner_id,
            scope,
            rules,
        }
    }

    /// Rule with the largest threshold not above `age_days`
    pub fn governing_rule(&self, age_days: i64) -> Option<&Rule> {
        self.rules
            .iter()
            .filter(|rule| rule.age_threshold_days <= age_days)
            .max_by_key(|rule| rule.age_threshold_days)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_order() {
        assert!(Action::Delete.severity() > Action::MoveToColdTier.severity());
    }

    #[test]
    fn test_action_parse() {
        assert_eq!(Action::parse("DELETE"), Some(Action::Delete));
        assert_eq!(Action::parse("move_to_cold_tier"), Some(Action::MoveToColdTier));
        assert_eq!(Action::parse("archive"), None);
    }

    #[test]
    fn test_governing_rule_picks_largest_qualifying() {
        let set = RuleSet::new(
            OwnerId::new(),
            RuleScope::Global,
            vec![
                Rule::new(30, Action::MoveToColdTier),
                Rule::new(180, Action::Delete),
            ],
        );

        assert!(set.governing_rule(29).is_none());
        assert_eq!(set.governing_rule(30).unwrap().action, Action::MoveToColdTier);
        assert_eq!(set.governing_rule(179).unwrap().action, Action::MoveToColdTier);
        assert_eq!(set.governing_rule(181).unwrap().action, Action::Delete);
    }

    #[test]
    fn test_target_tiers() {
        assert_eq!(GoverningAction::None.target_tier(), None);
        assert_eq!(GoverningAction::from(Action::Delete).target_tier(), Some(StorageTier::Deleted));
        assert_eq!(
            GoverningAction::from(Action::MoveToColdTier).target_tier(),
            Some(StorageTier::Cold)
        );
    }
}
