//! JSON request and response bodies
//!
//! Identifiers travel as hyphenated UUID strings; tiers and actions as their
//! snake_case names.

use serde::{Deserialize, Serialize};
use shoebox_domain::{Action, AlbumId, OwnerId, Photo, Rule, RuleId, RuleScope, RuleSet, RuleSetId};
use shoebox_engine::{LedgerDrift, QuotaSnapshot};
use shoebox_scheduler::{OwnerReport, PlannedTransition, SweepReport};
use std::str::FromStr;

/// One rule of a rule set payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBody {
    /// Rule id; assigned by the server when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Age in whole days at which the rule fires
    pub age_threshold_days: i64,
    /// `move_to_cold_tier` or `delete`
    pub action: String,
}

/// Rule set payload for create and update
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSetRequest {
    /// Owner of the set
    pub owner_id: String,
    /// Album the set is scoped to; global when absent
    #[serde(default)]
    pub album_id: Option<String>,
    /// Rules in threshold order
    #[serde(default)]
    pub rules: Vec<RuleBody>,
}

impl RuleSetRequest {
    /// Convert into a rule set with the given id
    pub fn into_rule_set(self, id: RuleSetId) -> Result<RuleSet, String> {
        let owner_id = parse_id::<OwnerId>(&self.owner_id)?;
        let scope = match self.album_id.as_deref() {
            None => RuleScope::Global,
            Some(album) => RuleScope::Album(parse_id::<AlbumId>(album)?),
        };
        let rules = self
            .rules
            .into_iter()
            .map(|rule| {
                let action = Action::parse(&rule.action)
                    .ok_or_else(|| format!("Unknown action: {}", rule.action))?;
                let id = match rule.id.as_deref() {
                    Some(id) => parse_id::<RuleId>(id)?,
                    None => RuleId::new(),
                };
                Ok(Rule {
                    id,
                    age_threshold_days: rule.age_threshold_days,
                    action,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        Ok(RuleSet {
            id,
            owner_id,
            scope,
            rules,
        })
    }
}

/// Rule set as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSetResponse {
    /// Rule set id
    pub id: String,
    /// Owner of the set
    pub owner_id: String,
    /// Album scope, absent for the global set
    pub album_id: Option<String>,
    /// Rules in threshold order
    pub rules: Vec<RuleBody>,
}

impl From<&RuleSet> for RuleSetResponse {
    fn from(rule_set: &RuleSet) -> Self {
        Self {
            id: rule_set.id.to_string(),
            owner_id: rule_set.owner_id.to_string(),
            album_id: rule_set.scope.album_id().map(|a| a.to_string()),
            rules: rule_set
                .rules
                .iter()
                .map(|rule| RuleBody {
                    id: Some(rule.id.to_string()),
                    age_threshold_days: rule.age_threshold_days,
                    action: rule.action.as_str().to_string(),
                })
                .collect(),
        }
    }
}

/// Upload registration payload
#[derive(Debug, Clone, Deserialize)]
pub struct UploadRequest {
    /// Owner to charge
    pub owner_id: String,
    /// Size of the original, in bytes
    pub original_size: u64,
    /// Size of the thumbnail, in bytes
    #[serde(default)]
    pub thumbnail_size: u64,
    /// Albums the photo belongs to
    #[serde(default)]
    pub album_ids: Vec<String>,
}

/// Photo as returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoResponse {
    /// Photo id
    pub id: String,
    /// Owner
    pub owner_id: String,
    /// Original size in bytes
    pub original_size: u64,
    /// Thumbnail size in bytes
    pub thumbnail_size: u64,
    /// Upload instant, seconds since the epoch
    pub uploaded_at: u64,
    /// `standard`, `cold` or `deleted`
    pub storage_tier: String,
    /// Freeze flag
    pub frozen: bool,
    /// Last unfreeze instant
    pub unfrozen_at: Option<u64>,
    /// Albums the photo belongs to
    pub album_ids: Vec<String>,
    /// Optimistic-concurrency version
    pub version: u64,
    /// Waiting for the storage backend
    pub pending_retry: bool,
    /// Excluded from automatic processing
    pub quarantined: bool,
}

impl From<&Photo> for PhotoResponse {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id.to_string(),
            owner_id: photo.owner_id.to_string(),
            original_size: photo.original_size,
            thumbnail_size: photo.thumbnail_size,
            uploaded_at: photo.uploaded_at,
            storage_tier: photo.storage_tier.as_str().to_string(),
            frozen: photo.frozen,
            unfrozen_at: photo.unfrozen_at,
            album_ids: photo.album_ids.iter().map(|a| a.to_string()).collect(),
            version: photo.version,
            pending_retry: photo.pending_retry,
            quarantined: photo.quarantined,
        }
    }
}

/// Quota snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaResponse {
    /// Owner
    pub owner_id: String,
    /// Limit in bytes (0 = unlimited)
    pub quota_limit: u64,
    /// Weighted bytes in use
    pub used_space: u64,
    /// Bytes left, absent when unlimited
    pub available: Option<u64>,
}

impl From<QuotaSnapshot> for QuotaResponse {
    fn from(snapshot: QuotaSnapshot) -> Self {
        Self {
            owner_id: snapshot.owner_id.to_string(),
            quota_limit: snapshot.quota_limit,
            used_space: snapshot.used_space,
            available: snapshot.available(),
        }
    }
}

/// New quota limit
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaLimitRequest {
    /// Limit in bytes (0 = unlimited)
    pub quota_limit: u64,
}

/// Manual sweep trigger
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    /// Plan only, commit nothing
    #[serde(default)]
    pub dry_run: bool,
}

/// A transition a dry run would commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedBody {
    /// Photo that would move
    pub photo_id: String,
    /// Current tier
    pub from: String,
    /// Target tier
    pub to: String,
    /// Triggering rule
    pub rule_id: Option<String>,
}

impl From<&PlannedTransition> for PlannedBody {
    fn from(planned: &PlannedTransition) -> Self {
        Self {
            photo_id: planned.photo_id.to_string(),
            from: planned.from.as_str().to_string(),
            to: planned.to.as_str().to_string(),
            rule_id: planned.rule_id.map(|r| r.to_string()),
        }
    }
}

/// Outcome of one owner partition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerReportBody {
    /// Owner
    pub owner_id: String,
    /// Photos looked at
    pub examined: usize,
    /// Committed transitions
    pub transitions: usize,
    /// Photos already in their governed state
    pub unchanged: usize,
    /// Photos waiting for the storage backend
    pub deferred: usize,
    /// Photos that kept losing version races
    pub conflicts: usize,
    /// Photos quarantined
    pub quarantined: usize,
    /// Other failures
    pub failed: usize,
    /// Dry-run plan
    pub planned: Vec<PlannedBody>,
    /// Whether the partition ran to the end
    pub completed: bool,
}

impl From<&OwnerReport> for OwnerReportBody {
    fn from(report: &OwnerReport) -> Self {
        Self {
            owner_id: report.owner_id.to_string(),
            examined: report.examined,
            transitions: report.total_transitions(),
            unchanged: report.unchanged,
            deferred: report.deferred,
            conflicts: report.conflicts,
            quarantined: report.quarantined,
            failed: report.failed,
            planned: report.planned.iter().map(PlannedBody::from).collect(),
            completed: report.completed,
        }
    }
}

/// Result of a manual sweep
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepResponse {
    /// Sweep start, seconds since the epoch
    pub started_at: u64,
    /// Whether transitions were only planned
    pub dry_run: bool,
    /// Whether shutdown stopped the sweep early
    pub cancelled: bool,
    /// Photos looked at
    pub examined: usize,
    /// Committed transitions
    pub transitions: usize,
    /// Per-owner outcomes
    pub owners: Vec<OwnerReportBody>,
}

impl From<&SweepReport> for SweepResponse {
    fn from(report: &SweepReport) -> Self {
        Self {
            started_at: report.started_at,
            dry_run: report.dry_run,
            cancelled: report.cancelled,
            examined: report.total_examined(),
            transitions: report.total_transitions(),
            owners: report.owners.iter().map(OwnerReportBody::from).collect(),
        }
    }
}

/// Ledger check request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LedgerCheckRequest {
    /// Reseed drifted owners
    #[serde(default)]
    pub repair: bool,
}

/// An owner whose ledger disagrees with its photos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftBody {
    /// Owner
    pub owner_id: String,
    /// Bytes held by the ledger
    pub cached: u64,
    /// Bytes recomputed from photos
    pub expected: u64,
}

impl From<&LedgerDrift> for DriftBody {
    fn from(drift: &LedgerDrift) -> Self {
        Self {
            owner_id: drift.owner_id.to_string(),
            cached: drift.cached,
            expected: drift.expected,
        }
    }
}

/// Ledger check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerCheckResponse {
    /// No owner drifted
    pub consistent: bool,
    /// Drifted owners
    pub drifted: Vec<DriftBody>,
    /// Whether drifted owners were reseeded
    pub repaired: bool,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status
    pub status: String,
    /// Owners holding photos
    pub owners: usize,
    /// Whether a sweep is in progress
    pub sweep_running: bool,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// Individual validation failures
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Parse a hyphenated UUID identifier
pub fn parse_id<T: FromStr<Err = String>>(s: &str) -> Result<T, String> {
    s.parse::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_set_request_conversion() {
        let owner = OwnerId::new();
        let album = AlbumId::new();
        let body = format!(
            r#"{{"owner_id": "{}", "album_id": "{}", "rules": [
                {{"age_threshold_days": 30, "action": "move_to_cold_tier"}},
                {{"age_threshold_days": 180, "action": "delete"}}
            ]}}"#,
            owner, album
        );
        let request: RuleSetRequest = serde_json::from_str(&body).unwrap();
        let id = RuleSetId::new();
        let rule_set = request.into_rule_set(id).unwrap();

        assert_eq!(rule_set.id, id);
        assert_eq!(rule_set.owner_id, owner);
        assert_eq!(rule_set.scope, RuleScope::Album(album));
        assert_eq!(rule_set.rules.len(), 2);
        assert_eq!(rule_set.rules[1].action, Action::Delete);

        let response = RuleSetResponse::from(&rule_set);
        assert_eq!(response.album_id, Some(album.to_string()));
        assert_eq!(response.rules[0].action, "move_to_cold_tier");
    }

    #[test]
    fn test_rule_set_request_rejects_bad_input() {
        let request = RuleSetRequest {
            owner_id: "not-a-uuid".to_string(),
            album_id: None,
            rules: vec![],
        };
        assert!(request.into_rule_set(RuleSetId::new()).is_err());

        let request = RuleSetRequest {
            owner_id: OwnerId::new().to_string(),
            album_id: None,
            rules: vec![RuleBody {
                id: None,
                age_threshold_days: 30,
                action: "archive".to_string(),
            }],
        };
        let err = request.into_rule_set(RuleSetId::new()).unwrap_err();
        assert!(err.contains("archive"));
    }

    #[test]
    fn test_photo_response() {
        let photo = Photo::uploaded(OwnerId::new(), 10, 2, 1_000);
        let response = PhotoResponse::from(&photo);
        assert_eq!(response.storage_tier, "standard");
        assert_eq!(response.uploaded_at, 1_000);
        assert!(!response.frozen);
    }
}
