//! Shoebox Domain Layer
//!
//! This crate contains the data model and pure lifecycle logic of the Shoebox
//! storage lifecycle engine. It has no infrastructure dependencies and defines
//! the value objects and trait interfaces that all other layers depend upon.
//!
//! ## Key Concepts
//!
//! - **Photo**: an owned object with a storage tier, a freeze flag and a version
//! - **RuleSet**: up to three age-triggered rules, scoped globally or to an album
//! - **Governing action**: the single action a photo is due at a given instant
//! - **Lifecycle policy**: the configurable constants (rule cap, freeze weight,
//!   re-freeze cooldown, cold-tier cost)
//! - **Tiers**: Standard → Cold → Deleted, never backwards
//!
//! ## Architecture
//!
//! - Pure business logic only, no I/O
//! - Persistence, object storage and audit sinks live behind traits
//! - Infrastructure implementations live in other crates

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audit;
pub mod clock;
pub mod ids;
pub mod photo;
pub mod policy;
pub mod resolver;
pub mod rule;
pub mod tier;
pub mod traits;
pub mod transition;

// Re-exports for convenience
pub use audit::{AuditEvent, TransitionRecord};
pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{AlbumId, OwnerId, PhotoId, RuleId, RuleSetId};
pub use photo::Photo;
pub use policy::{LifecyclePolicy, MAX_PHOTO_BYTES, SECONDS_PER_DAY};
pub use resolver::{resolve, select_rule_set, Resolution, ResolveError};
pub use rule::{Action, GoverningAction, Rule, RuleScope, RuleSet};
pub use tier::StorageTier;
pub use traits::{AuditSink, CasOutcome, LifecycleStore};
pub use transition::{plan_transition, Transition};
