//! Lifecycle resolver
//!
//! Determines the single governing action for a photo at an instant:
//!
//! 1. An album-scoped rule set attached to one of the photo's albums governs.
//!    Album scope strictly overrides Global.
//! 2. Otherwise the owner's Global rule set governs, if there is one.
//! 3. Within the selected set, the rule with the largest threshold that the
//!    photo's age (whole days) has reached wins.
//!
//! Because the largest qualifying threshold wins, a photo that missed several
//! sweeps goes straight to its most advanced action instead of replaying the
//! intermediate ones.
//!
//! Two album sets claiming the same photo is a data-integrity violation. The
//! resolver refuses to pick one and reports it.

use crate::{GoverningAction, OwnerId, Photo, PhotoId, RuleId, RuleScope, RuleSet, RuleSetId};
use std::fmt;

/// Outcome of resolving one photo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    /// The governing action
    pub action: GoverningAction,
    /// Rule set that was selected, if any applied
    pub rule_set_id: Option<RuleSetId>,
    /// Rule that fired, if any
    pub rule_id: Option<RuleId>,
    /// Photo age used for the decision
    pub age_days: i64,
}

/// Data-integrity failures detected during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Several album rule sets govern the same photo
    ConflictingAlbumRuleSets {
        /// Photo being resolved
        photo_id: PhotoId,
        /// The competing rule sets
        rule_sets: Vec<RuleSetId>,
    },
    /// The owner has more than one Global rule set
    DuplicateGlobalRuleSets {
        /// Owner with the duplicates
        owner_id: OwnerId,
        /// The competing rule sets
        rule_sets: Vec<RuleSetId>,
    },
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::ConflictingAlbumRuleSets { photo_id, rule_sets } => write!(
                f,
                "photo {} is governed by {} album rule sets: {}",
                photo_id,
                rule_sets.len(),
                join_ids(rule_sets)
            ),
            ResolveError::DuplicateGlobalRuleSets { owner_id, rule_sets } => write!(
                f,
                "owner {} has {} global rule sets: {}",
                owner_id,
                rule_sets.len(),
                join_ids(rule_sets)
            ),
        }
    }
}

impl std::error::Error for ResolveError {}

fn join_ids(ids: &[RuleSetId]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}

fn owned_by(candidates: &[RuleSet], owner_id: OwnerId) -> impl Iterator<Item = &RuleSet> {
    candidates.iter().filter(move |set| set.owner_id == owner_id)
}

/// Select the rule set that governs `photo`, if any
///
/// Candidates belonging to other owners are ignored.
pub fn select_rule_set<'a>(
    photo: &Photo,
    candidates: &'a [RuleSet],
) -> Result<Option<&'a RuleSet>, ResolveError> {
    let album_sets: Vec<&RuleSet> = owned_by(candidates, photo.owner_id)
        .filter(|set| match set.scope {
            RuleScope::Album(album_id) => photo.album_ids.contains(&album_id),
            RuleScope::Global => false,
        })
        .collect();

    match album_sets.as_slice() {
        [single] => return Ok(Some(*single)),
        [] => {}
        many => {
            return Err(ResolveError::ConflictingAlbumRuleSets {
                photo_id: photo.id,
                rule_sets: many.iter().map(|set| set.id).collect(),
            })
        }
    }

    let global_sets: Vec<&RuleSet> = owned_by(candidates, photo.owner_id)
        .filter(|set| set.scope == RuleScope::Global)
        .collect();
    match global_sets.as_slice() {
        [] => Ok(None),
        [single] => Ok(Some(*single)),
        many => Err(ResolveError::DuplicateGlobalRuleSets {
            owner_id: photo.owner_id,
            rule_sets: many.iter().map(|set| set.id).collect(),
        }),
    }
}

/// Resolve the governing action for `photo` at `now` (seconds since epoch)
pub fn resolve(photo: &Photo, candidates: &[RuleSet], now: u64) -> Result<Resolution, ResolveError> {
    let age_days = photo.age_days(now);

    let Some(rule_set) = select_rule_set(photo, candidates)? else {
        return Ok(Resolution {
            action: GoverningAction::None,
            rule_set_id: None,
            rule_id: None,
            age_days,
        });
    };

    let rule = rule_set.governing_rule(age_days);
    Ok(Resolution {
        action: rule.map_or(GoverningAction::None, |r| r.action.into()),
        rule_set_id: Some(rule_set.id),
        rule_id: rule.map(|r| r.id),
        age_days,
    })
}
