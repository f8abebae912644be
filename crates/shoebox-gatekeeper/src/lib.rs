//! Shoebox Gatekeeper
//!
//! Structural validation of lifecycle rule sets.
//!
//! The Gatekeeper rejects, and never repairs:
//! - more rules than the configured cap (default 3)
//! - non-positive thresholds
//! - duplicate thresholds, or thresholds not strictly increasing by position
//! - a Delete rule whose threshold is below a MoveToColdTier threshold
//! - a second rule set for the same scope (Global, or one album) of one owner
//!
//! It is called by the HTTP layer before a rule set is persisted and again by
//! the scheduler before a stored rule set is consumed.
//!
//! # Examples
//!
//! ```
//! use shoebox_domain::{Action, OwnerId, Rule, RuleScope, RuleSet};
//! use shoebox_gatekeeper::Gatekeeper;
//!
//! let gatekeeper = Gatekeeper::default_config();
//! let rule_set = RuleSet::new(
//!     OwnerId::new(),
//!     RuleScope::Global,
//!     vec![Rule::new(30, Action::MoveToColdTier), Rule::new(180, Action::Delete)],
//! );
//!
//! assert!(gatekeeper.validate(&rule_set, &[]).is_ok());
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod validator;

pub use config::ValidationConfig;
pub use error::ValidationError;
pub use validator::{Gatekeeper, RejectionReason};
