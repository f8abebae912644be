//! Partitioned lifecycle sweep
//!
//! A sweep lists every owner and processes each owner's photos as one
//! partition. Partitions run in parallel, up to `worker_count` at a time;
//! inside a partition photos are handled one after another, so two workers
//! never touch the same owner's photos or ledger entry.
//!
//! Per photo: resolve the governing action, and if it differs from the
//! photo's tier, hand it to the state machine. Errors stay with the photo
//! that caused them:
//!
//! - `Conflict`: re-read, re-resolve and retry within the conflict budget
//! - `CollaboratorUnavailable`: the engine flagged the photo pending; move on
//! - integrity failure: quarantine the photo
//! - anything else: audit and move on
//!
//! Cancellation is checked once per photo. A cancelled sweep leaves every
//! photo in a committed state; the next sweep re-derives the rest.

use crate::{
    OwnerReport, PlannedTransition, SchedulerConfig, SchedulerError, SweepMetrics, SweepReport,
};
use shoebox_domain::{
    plan_transition, resolve, AuditEvent, LifecycleStore, OwnerId, Photo, RuleSet, RuleSetId,
    Transition,
};
use shoebox_engine::{LifecycleEngine, LifecycleError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Runs lifecycle sweeps over all owners
pub struct Scheduler<S> {
    engine: Arc<LifecycleEngine<S>>,
    config: SchedulerConfig,
    metrics: Mutex<SweepMetrics>,
    running: tokio::sync::Mutex<()>,
}

impl<S: LifecycleStore + 'static> Scheduler<S> {
    /// Create a scheduler over an engine
    pub fn new(engine: Arc<LifecycleEngine<S>>, config: SchedulerConfig) -> Self {
        Self {
            engine,
            config,
            metrics: Mutex::new(SweepMetrics::new()),
            running: tokio::sync::Mutex::new(()),
        }
    }

    /// The scheduler's configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The engine sweeps are applied through
    pub fn engine(&self) -> &Arc<LifecycleEngine<S>> {
        &self.engine
    }

    /// Snapshot of the cumulative metrics
    pub fn metrics(&self) -> SweepMetrics {
        self.metrics
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Reset metrics counters
    pub fn reset_metrics(&self) {
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.reset();
        }
    }

    /// Whether a sweep currently holds the run lock
    pub fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    /// Run one sweep with the configured dry-run setting
    pub async fn sweep(&self, cancel: &CancellationToken) -> Result<SweepReport, SchedulerError> {
        self.sweep_with(self.config.dry_run, cancel).await
    }

    /// Run one sweep
    ///
    /// Fails with `AlreadyRunning` instead of queueing behind a sweep in
    /// progress. With `dry_run`, intended transitions are logged and returned
    /// in the report and nothing is committed.
    pub async fn sweep_with(
        &self,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> Result<SweepReport, SchedulerError> {
        let _running = self
            .running
            .try_lock()
            .map_err(|_| SchedulerError::AlreadyRunning)?;

        let start = Instant::now();
        let mut report = SweepReport::new(self.engine.now(), dry_run);
        let owners = self
            .engine
            .store()
            .owners()
            .map_err(|e| SchedulerError::Store(e.to_string()))?;

        tracing::info!(
            "{}Starting sweep over {} owners ({} workers)",
            if dry_run { "DRY RUN: " } else { "" },
            owners.len(),
            self.config.worker_count
        );

        let workers = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut partitions = JoinSet::new();

        for owner_id in owners {
            if cancel.is_cancelled() {
                break;
            }
            let permit = tokio::select! {
                permit = workers.clone().acquire_owned() => {
                    permit.map_err(|e| SchedulerError::Worker(e.to_string()))?
                }
                _ = cancel.cancelled() => break,
            };

            let engine = self.engine.clone();
            let cancel = cancel.clone();
            partitions.spawn(async move {
                let _permit = permit;
                sweep_owner(&engine, owner_id, dry_run, &cancel).await
            });
        }

        while let Some(joined) = partitions.join_next().await {
            match joined {
                Ok(owner_report) => report.owners.push(owner_report),
                Err(e) => tracing::error!("Owner partition task failed: {}", e),
            }
        }

        report.owners.sort_by_key(|o| o.owner_id);
        report.cancelled = cancel.is_cancelled();

        let runtime_ms = start.elapsed().as_millis() as u64;
        if let Ok(mut metrics) = self.metrics.lock() {
            metrics.record_sweep(&report, runtime_ms);
        }

        tracing::info!(
            "{}Sweep finished in {}ms: {} examined, {} transitions, {} planned{}",
            if dry_run { "DRY RUN: " } else { "" },
            runtime_ms,
            report.total_examined(),
            report.total_transitions(),
            report.total_planned(),
            if report.cancelled { " (cancelled)" } else { "" }
        );

        Ok(report)
    }
}

/// Process one owner's photos in order
async fn sweep_owner<S: LifecycleStore>(
    engine: &LifecycleEngine<S>,
    owner_id: OwnerId,
    dry_run: bool,
    cancel: &CancellationToken,
) -> OwnerReport {
    let mut report = OwnerReport::new(owner_id);
    let started_at = engine.now();

    let (rule_sets, photos) = match load_partition(engine, owner_id) {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("Failed to load partition of owner {}: {}", owner_id, e);
            return report;
        }
    };

    let invalid = revalidate(engine, &rule_sets);

    for photo in photos.into_iter().filter(Photo::is_schedulable) {
        if cancel.is_cancelled() {
            tracing::info!("Sweep of owner {} cancelled", owner_id);
            return report;
        }
        report.examined += 1;
        process_photo(engine, photo, &rule_sets, &invalid, dry_run, &mut report).await;
    }

    report.completed = true;
    if !dry_run {
        if let Err(e) = engine.store().record_run(owner_id, started_at) {
            tracing::warn!("Failed to record watermark for owner {}: {}", owner_id, e);
        }
    }
    tracing::debug!(
        "Owner {}: {} examined, {} transitions",
        owner_id,
        report.examined,
        report.total_transitions()
    );
    report
}

fn load_partition<S: LifecycleStore>(
    engine: &LifecycleEngine<S>,
    owner_id: OwnerId,
) -> Result<(Vec<RuleSet>, Vec<Photo>), LifecycleError> {
    let rule_sets = engine.rule_sets_for_owner(owner_id)?;
    let photos = engine
        .store()
        .photos_for_owner(owner_id)
        .map_err(|e| LifecycleError::Store(e.to_string()))?;
    Ok((rule_sets, photos))
}

/// Structural re-check of stored rule sets; returns the ids that failed
fn revalidate<S: LifecycleStore>(
    engine: &LifecycleEngine<S>,
    rule_sets: &[RuleSet],
) -> HashSet<RuleSetId> {
    rule_sets
        .iter()
        .filter_map(|rule_set| match engine.revalidate(rule_set) {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    "Stored rule set {} failed revalidation, its photos are skipped: {}",
                    rule_set.id,
                    e
                );
                Some(rule_set.id)
            }
        })
        .collect()
}

async fn process_photo<S: LifecycleStore>(
    engine: &LifecycleEngine<S>,
    mut photo: Photo,
    rule_sets: &[RuleSet],
    invalid: &HashSet<RuleSetId>,
    dry_run: bool,
    report: &mut OwnerReport,
) {
    let attempts = engine.retry().conflict_attempts.max(1);

    for attempt in 1..=attempts {
        let now = engine.now();
        let resolution = match resolve(&photo, rule_sets, now) {
            Ok(resolution) => resolution,
            Err(err) => {
                report.quarantined += 1;
                if dry_run {
                    tracing::info!("DRY RUN: Would quarantine photo {}: {}", photo.id, err);
                } else if let Err(e) = engine.quarantine(photo.id, &err.to_string()).await {
                    tracing::error!("Failed to quarantine photo {}: {}", photo.id, e);
                }
                return;
            }
        };

        if let Some(rule_set_id) = resolution.rule_set_id.filter(|id| invalid.contains(id)) {
            report.failed += 1;
            record_failure(
                engine,
                &photo,
                "validation",
                format!("governing rule set {} failed revalidation", rule_set_id),
            );
            return;
        }

        let Transition::Advance { from, to } = plan_transition(photo.storage_tier, resolution.action)
        else {
            report.unchanged += 1;
            return;
        };

        if dry_run {
            tracing::info!(
                "DRY RUN: Would move photo {} {} -> {} (age {} days, rule {:?})",
                photo.id,
                from,
                to,
                resolution.age_days,
                resolution.rule_id
            );
            report.planned.push(PlannedTransition {
                photo_id: photo.id,
                from,
                to,
                rule_id: resolution.rule_id,
            });
            return;
        }

        match engine.apply(&photo, resolution.action, resolution.rule_id).await {
            Ok(_) => {
                report.record_transition(to);
                return;
            }
            Err(LifecycleError::Conflict { .. }) => {
                tracing::warn!(
                    "Conflict on photo {} (attempt {}/{}), re-reading",
                    photo.id,
                    attempt,
                    attempts
                );
            }
            Err(LifecycleError::CollaboratorUnavailable { .. }) => {
                report.deferred += 1;
                return;
            }
            Err(e) => {
                report.failed += 1;
                record_failure(engine, &photo, e.kind(), e.to_string());
                return;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(engine.retry().conflict_backoff(attempt)).await;
        }
        photo = match engine.get_photo(photo.id) {
            Ok(fresh) if fresh.is_schedulable() => fresh,
            Ok(_) => {
                report.unchanged += 1;
                return;
            }
            Err(e) => {
                report.failed += 1;
                record_failure(engine, &photo, e.kind(), e.to_string());
                return;
            }
        };
    }

    report.conflicts += 1;
    record_failure(
        engine,
        &photo,
        "conflict",
        format!("still conflicting after {} attempts; retried next sweep", attempts),
    );
}

fn record_failure<S: LifecycleStore>(
    engine: &LifecycleEngine<S>,
    photo: &Photo,
    kind: &str,
    detail: String,
) {
    tracing::error!("Photo {} failed ({}): {}", photo.id, kind, detail);
    engine.audit().record(&AuditEvent::Failure {
        photo_id: photo.id,
        kind: kind.to_string(),
        detail,
        timestamp: engine.now(),
    });
}
