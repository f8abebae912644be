//! Error types for lifecycle operations

use shoebox_domain::{OwnerId, PhotoId, ResolveError, RuleSetId};
use shoebox_gatekeeper::ValidationError;
use thiserror::Error;

/// Errors surfaced by the lifecycle engine
#[derive(Error, Debug)]
pub enum LifecycleError {
    /// Malformed rule set, rejected before persistence
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Another writer kept winning the version race
    #[error("Photo {photo_id} was modified concurrently ({attempts} attempts)")]
    Conflict {
        /// Photo being written
        photo_id: PhotoId,
        /// Attempts made before giving up
        attempts: u32,
    },

    /// The photo was unfrozen too recently to be frozen again
    #[error("Photo {photo_id} cannot be frozen for another {remaining_secs}s")]
    CooldownActive {
        /// Photo being frozen
        photo_id: PhotoId,
        /// Seconds until the cooldown ends
        remaining_secs: u64,
    },

    /// Freeze requested on a frozen photo
    #[error("Photo {0} is already frozen")]
    AlreadyFrozen(PhotoId),

    /// Unfreeze requested on a photo that is not frozen
    #[error("Photo {0} is not frozen")]
    NotFrozen(PhotoId),

    /// The storage backend could not complete a move or delete
    #[error("Storage backend unavailable for photo {photo_id}: {reason}")]
    CollaboratorUnavailable {
        /// Photo being transitioned
        photo_id: PhotoId,
        /// Last backend error
        reason: String,
    },

    /// The photo resolves to more than one governing rule set
    #[error("Integrity error: {0}")]
    Integrity(#[from] ResolveError),

    /// No photo with this id
    #[error("Photo not found: {0}")]
    PhotoNotFound(PhotoId),

    /// The photo is a deleted tombstone
    #[error("Photo {0} has been deleted")]
    PhotoDeleted(PhotoId),

    /// No rule set with this id
    #[error("Rule set not found: {0}")]
    RuleSetNotFound(RuleSetId),

    /// Accepting the bytes would push the owner over quota
    #[error("Quota exceeded for owner {owner_id}: {requested} bytes requested, {available} available")]
    QuotaExceeded {
        /// Owner being charged
        owner_id: OwnerId,
        /// Bytes requested
        requested: u64,
        /// Bytes left under the limit
        available: u64,
    },

    /// Upload sizes outside the representable range
    #[error("Photo size out of range: {original_size} + {thumbnail_size} bytes")]
    SizeOutOfRange {
        /// Submitted original size
        original_size: u64,
        /// Submitted thumbnail size
        thumbnail_size: u64,
    },

    /// Engine configuration rejected at construction
    #[error("Invalid engine configuration: {0}")]
    Config(String),

    /// Persistence failure
    #[error("Storage error: {0}")]
    Store(String),
}

impl LifecycleError {
    /// Classification recorded in audit failure events
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleError::Validation(_) => "validation",
            LifecycleError::Conflict { .. } => "conflict",
            LifecycleError::CooldownActive { .. } => "cooldown_active",
            LifecycleError::AlreadyFrozen(_) => "already_frozen",
            LifecycleError::NotFrozen(_) => "not_frozen",
            LifecycleError::CollaboratorUnavailable { .. } => "collaborator_unavailable",
            LifecycleError::Integrity(_) => "integrity",
            LifecycleError::PhotoNotFound(_) => "photo_not_found",
            LifecycleError::PhotoDeleted(_) => "photo_deleted",
            LifecycleError::RuleSetNotFound(_) => "rule_set_not_found",
            LifecycleError::QuotaExceeded { .. } => "quota_exceeded",
            LifecycleError::SizeOutOfRange { .. } => "size_out_of_range",
            LifecycleError::Config(_) => "config",
            LifecycleError::Store(_) => "store",
        }
    }

    /// Whether a later attempt may succeed without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LifecycleError::Conflict { .. }
                | LifecycleError::CollaboratorUnavailable { .. }
                | LifecycleError::Store(_)
        )
    }
}

pub(crate) fn store_error(err: impl std::fmt::Display) -> LifecycleError {
    LifecycleError::Store(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let conflict = LifecycleError::Conflict {
            photo_id: PhotoId::new(),
            attempts: 3,
        };
        assert!(conflict.is_transient());
        assert_eq!(conflict.kind(), "conflict");

        assert!(!LifecycleError::AlreadyFrozen(PhotoId::new()).is_transient());
        assert!(!LifecycleError::Integrity(ResolveError::DuplicateGlobalRuleSets {
            owner_id: OwnerId::new(),
            rule_sets: vec![],
        })
        .is_transient());
    }

    #[test]
    fn test_cooldown_message() {
        let err = LifecycleError::CooldownActive {
            photo_id: PhotoId::from_value(1),
            remaining_secs: 60,
        };
        assert!(err.to_string().contains("another 60s"));
    }
}
