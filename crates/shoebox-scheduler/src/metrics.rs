//! Sweep reports and cumulative metrics

use shoebox_domain::{OwnerId, PhotoId, RuleId, StorageTier};
use std::collections::HashMap;

/// A transition a dry run would have committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTransition {
    /// Photo that would move
    pub photo_id: PhotoId,
    /// Current tier
    pub from: StorageTier,
    /// Target tier
    pub to: StorageTier,
    /// Rule that would trigger it
    pub rule_id: Option<RuleId>,
}

/// Outcome of one owner partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerReport {
    /// Owner of the partition
    pub owner_id: OwnerId,
    /// Live, non-quarantined photos looked at
    pub examined: usize,
    /// Committed transitions by target tier
    pub transitions: HashMap<StorageTier, usize>,
    /// Photos already in their governed state
    pub unchanged: usize,
    /// Photos left pending because the storage backend was unavailable
    pub deferred: usize,
    /// Photos that kept losing version races
    pub conflicts: usize,
    /// Photos quarantined after an integrity failure
    pub quarantined: usize,
    /// Photos that failed for any other reason
    pub failed: usize,
    /// Transitions a dry run would have committed
    pub planned: Vec<PlannedTransition>,
    /// False if the partition stopped early
    pub completed: bool,
}

impl OwnerReport {
    /// Empty report for an owner
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            examined: 0,
            transitions: HashMap::new(),
            unchanged: 0,
            deferred: 0,
            conflicts: 0,
            quarantined: 0,
            failed: 0,
            planned: Vec::new(),
            completed: false,
        }
    }

    /// Count a committed transition
    pub fn record_transition(&mut self, to: StorageTier) {
        *self.transitions.entry(to).or_insert(0) += 1;
    }

    /// Committed transitions of any kind
    pub fn total_transitions(&self) -> usize {
        self.transitions.values().sum()
    }
}

/// Result of one sweep over every owner partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Instant the sweep started (clock of the engine)
    pub started_at: u64,
    /// Whether transitions were only planned
    pub dry_run: bool,
    /// Whether cancellation stopped the sweep early
    pub cancelled: bool,
    /// Per-owner outcomes, ordered by owner
    pub owners: Vec<OwnerReport>,
}

impl SweepReport {
    /// Empty report
    pub fn new(started_at: u64, dry_run: bool) -> Self {
        Self {
            started_at,
            dry_run,
            cancelled: false,
            owners: Vec::new(),
        }
    }

    /// Committed transitions across owners
    pub fn total_transitions(&self) -> usize {
        self.owners.iter().map(|o| o.total_transitions()).sum()
    }

    /// Planned transitions across owners (dry run)
    pub fn total_planned(&self) -> usize {
        self.owners.iter().map(|o| o.planned.len()).sum()
    }

    /// Photos examined across owners
    pub fn total_examined(&self) -> usize {
        self.owners.iter().map(|o| o.examined).sum()
    }

    /// Report of one owner, if its partition ran
    pub fn owner(&self, owner_id: OwnerId) -> Option<&OwnerReport> {
        self.owners.iter().find(|o| o.owner_id == owner_id)
    }
}

/// Metrics accumulated across sweeps
#[derive(Debug, Clone, Default)]
pub struct SweepMetrics {
    /// Transitions by target tier
    pub transitions: HashMap<StorageTier, usize>,

    /// Photos deferred to a later sweep
    pub deferred: usize,

    /// Photos that exhausted their conflict retries
    pub conflicts: usize,

    /// Photos quarantined
    pub quarantined: usize,

    /// Other per-photo failures
    pub failed: usize,

    /// Total sweep iterations completed
    pub sweep_count: usize,

    /// Sweeps stopped by cancellation
    pub cancelled_count: usize,

    /// Total runtime in milliseconds
    pub total_runtime_ms: u64,
}

impl SweepMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one sweep report into the totals
    pub fn record_sweep(&mut self, report: &SweepReport, runtime_ms: u64) {
        for owner in &report.owners {
            for (tier, count) in &owner.transitions {
                *self.transitions.entry(*tier).or_insert(0) += count;
            }
            self.deferred += owner.deferred;
            self.conflicts += owner.conflicts;
            self.quarantined += owner.quarantined;
            self.failed += owner.failed;
        }
        self.sweep_count += 1;
        if report.cancelled {
            self.cancelled_count += 1;
        }
        self.total_runtime_ms += runtime_ms;
    }

    /// Get total transitions across tiers
    pub fn total_transitions(&self) -> usize {
        self.transitions.values().sum()
    }

    /// Reset all metrics
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Generate a summary report of metrics
    pub fn summary(&self) -> String {
        let mut lines = vec![
            "Lifecycle Sweep Summary".to_string(),
            "=======================".to_string(),
            format!("Sweep cycles: {}", self.sweep_count),
            format!("Cancelled: {}", self.cancelled_count),
            format!("Total runtime: {}ms", self.total_runtime_ms),
            String::new(),
        ];

        if !self.transitions.is_empty() {
            lines.push("Transitions by target tier:".to_string());
            let mut tiers: Vec<_> = self.transitions.iter().collect();
            tiers.sort();
            for (tier, count) in tiers {
                lines.push(format!("  {}: {}", tier, count));
            }
            lines.push(format!("  Total: {}", self.total_transitions()));
            lines.push(String::new());
        }

        lines.push(format!("Deferred: {}", self.deferred));
        lines.push(format!("Conflicts: {}", self.conflicts));
        lines.push(format!("Quarantined: {}", self.quarantined));
        lines.push(format!("Failed: {}", self.failed));

        lines.join("\n")
    }
}
