//! Trait definitions for external interactions
//!
//! These traits define the boundaries between lifecycle logic and
//! infrastructure. Implementations live in other crates (`shoebox-store`
//! for persistence, `shoebox-engine` for audit sinks).

use crate::{AuditEvent, OwnerId, Photo, PhotoId, RuleSet, RuleSetId};

/// Result of a version-guarded photo write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The stored version matched and the write was committed
    Applied,
    /// Someone else wrote first; nothing was changed
    VersionMismatch,
}

/// Persistence for photos, rule sets, quota limits and sweep watermarks
///
/// Implemented by the infrastructure layer (shoebox-store). All methods take
/// `&self`: the scheduler and the freeze path share one store concurrently and
/// serialize on photo versions, not on the store handle.
pub trait LifecycleStore: Send + Sync {
    /// Error type for store operations
    type Error: std::fmt::Display + Send + Sync + 'static;

    /// Insert a new photo
    fn insert_photo(&self, photo: &Photo) -> Result<(), Self::Error>;

    /// Get a photo by ID (tombstones included)
    fn get_photo(&self, id: PhotoId) -> Result<Option<Photo>, Self::Error>;

    /// All photos of an owner (tombstones included)
    fn photos_for_owner(&self, owner_id: OwnerId) -> Result<Vec<Photo>, Self::Error>;

    /// Every owner that has at least one photo
    fn owners(&self) -> Result<Vec<OwnerId>, Self::Error>;

    /// Replace the stored photo with `photo` if its stored version is `expected_version`
    fn compare_and_swap(&self, photo: &Photo, expected_version: u64)
        -> Result<CasOutcome, Self::Error>;

    /// Insert a new rule set
    fn insert_rule_set(&self, rule_set: &RuleSet) -> Result<(), Self::Error>;

    /// Replace an existing rule set; returns false if it does not exist
    fn update_rule_set(&self, rule_set: &RuleSet) -> Result<bool, Self::Error>;

    /// Get a rule set by ID
    fn get_rule_set(&self, id: RuleSetId) -> Result<Option<RuleSet>, Self::Error>;

    /// All rule sets of an owner
    fn rule_sets_for_owner(&self, owner_id: OwnerId) -> Result<Vec<RuleSet>, Self::Error>;

    /// Explicit quota limit of an owner, if one was set
    fn quota_limit(&self, owner_id: OwnerId) -> Result<Option<u64>, Self::Error>;

    /// Set an owner's quota limit (0 means unlimited)
    fn set_quota_limit(&self, owner_id: OwnerId, limit: u64) -> Result<(), Self::Error>;

    /// Instant the owner's partition last completed a sweep
    fn last_run_at(&self, owner_id: OwnerId) -> Result<Option<u64>, Self::Error>;

    /// Record a completed sweep of the owner's partition
    fn record_run(&self, owner_id: OwnerId, at: u64) -> Result<(), Self::Error>;
}

/// Destination for audit events
///
/// Recording is infallible from the caller's point of view: a sink that cannot
/// persist an event reports it through its own logging. A failing audit sink
/// never rolls back a committed transition.
pub trait AuditSink: Send + Sync {
    /// Record one event
    fn record(&self, event: &AuditEvent);
}
