//! Audit records emitted by the engine
//!
//! Audit events are the durable trail of what the engine did to a photo and
//! why. They are separate from diagnostic logs.

use crate::{PhotoId, RuleId, StorageTier};

/// A committed tier transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    /// Photo that moved
    pub photo_id: PhotoId,
    /// Tier before the transition
    pub from_tier: StorageTier,
    /// Tier after the transition
    pub to_tier: StorageTier,
    /// Commit instant (seconds since Unix epoch)
    pub timestamp: u64,
    /// Rule that triggered the transition, if it was rule-driven
    pub rule_id: Option<RuleId>,
}

/// Event delivered to an [`AuditSink`](crate::AuditSink)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    /// A tier transition was committed
    Transition(TransitionRecord),

    /// Freeze state changed
    FreezeChanged {
        /// Photo affected
        photo_id: PhotoId,
        /// New value of the freeze flag
        frozen: bool,
        /// Instant of the change
        timestamp: u64,
    },

    /// Processing a photo failed; the photo was left in its prior state
    Failure {
        /// Photo affected
        photo_id: PhotoId,
        /// Error classification (e.g. `integrity`, `collaborator_unavailable`)
        kind: String,
        /// Human-readable detail
        detail: String,
        /// Instant of the failure
        timestamp: u64,
    },
}

impl AuditEvent {
    /// Photo the event concerns
    pub fn photo_id(&self) -> PhotoId {
        match self {
            AuditEvent::Transition(record) => record.photo_id,
            AuditEvent::FreezeChanged { photo_id, .. } => *photo_id,
            AuditEvent::Failure { photo_id, .. } => *photo_id,
        }
    }

    /// Short event kind used by sinks as a column or log field
    pub fn kind(&self) -> &str {
        match self {
            AuditEvent::Transition(_) => "transition",
            AuditEvent::FreezeChanged { frozen: true, .. } => "freeze",
            AuditEvent::FreezeChanged { frozen: false, .. } => "unfreeze",
            AuditEvent::Failure { kind, .. } => kind,
        }
    }
}
