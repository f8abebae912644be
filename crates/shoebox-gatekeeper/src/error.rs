//! Gatekeeper error types

use crate::RejectionReason;
use thiserror::Error;

/// A rule set failed validation
///
/// Carries every reason found, not just the first, so callers can report the
/// whole problem in one response.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Rule set rejected: {}", summarize(.reasons))]
pub struct ValidationError {
    /// Reasons for rejection (never empty)
    pub reasons: Vec<RejectionReason>,
}

fn summarize(reasons: &[RejectionReason]) -> String {
    reasons
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
