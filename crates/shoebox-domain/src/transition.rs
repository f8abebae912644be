//! Photo state machine transition table
//!
//! ```text
//!   Standard ──MoveToColdTier──▶ Cold ──Delete──▶ Deleted
//!      └──────────────Delete───────────────────────▲
//! ```
//!
//! Everything else is a no-op: repeating an action already in effect,
//! MoveToColdTier on a Cold photo, any action on a Deleted tombstone, and
//! `GoverningAction::None`. The table never moves a photo backwards.

use crate::{GoverningAction, StorageTier};

/// What applying an action to a photo in a given tier does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing changes except the version
    NoOp,
    /// The photo advances to a later tier
    Advance {
        /// Tier before the transition
        from: StorageTier,
        /// Tier after the transition
        to: StorageTier,
    },
}

impl Transition {
    /// Whether the transition changes the tier
    pub fn is_noop(&self) -> bool {
        matches!(self, Transition::NoOp)
    }
}

/// Look up the transition for `action` applied in `current`
pub fn plan_transition(current: StorageTier, action: GoverningAction) -> Transition {
    match action.target_tier() {
        Some(to) if current.can_advance_to(to) => Transition::Advance { from: current, to },
        _ => Transition::NoOp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use StorageTier::*;

    #[test]
    fn test_valid_transitions() {
        assert_eq!(
            plan_transition(Standard, GoverningAction::MoveToColdTier),
            Transition::Advance { from: Standard, to: Cold }
        );
        assert_eq!(
            plan_transition(Standard, GoverningAction::Delete),
            Transition::Advance { from: Standard, to: Deleted }
        );
        assert_eq!(
            plan_transition(Cold, GoverningAction::Delete),
            Transition::Advance { from: Cold, to: Deleted }
        );
    }

    #[test]
    fn test_idempotent_and_terminal_noops() {
        assert!(plan_transition(Cold, GoverningAction::MoveToColdTier).is_noop());
        assert!(plan_transition(Deleted, GoverningAction::Delete).is_noop());
        assert!(plan_transition(Deleted, GoverningAction::MoveToColdTier).is_noop());
        assert!(plan_transition(Standard, GoverningAction::None).is_noop());
        assert!(plan_transition(Cold, GoverningAction::None).is_noop());
    }
}
