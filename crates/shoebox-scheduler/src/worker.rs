//! Background worker for periodic sweeps

use crate::{Scheduler, SchedulerError, SweepReport};
use shoebox_domain::LifecycleStore;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Background worker that runs the scheduler on an interval
///
/// # Examples
///
/// ```no_run
/// use shoebox_engine::{EngineConfig, InMemoryStorage, LifecycleEngine};
/// use shoebox_scheduler::{Scheduler, SchedulerConfig, SchedulerWorker};
/// use shoebox_store::SqliteStore;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(SqliteStore::new("shoebox.db")?);
///     let engine = LifecycleEngine::new(store, Arc::new(InMemoryStorage::new()), &EngineConfig::default())?;
///     let scheduler = Arc::new(Scheduler::new(Arc::new(engine), SchedulerConfig::default()));
///
///     // Run until Ctrl+C
///     SchedulerWorker::new(scheduler).run().await?;
///     Ok(())
/// }
/// ```
pub struct SchedulerWorker<S> {
    scheduler: Arc<Scheduler<S>>,
    interval: Duration,
    cancel: CancellationToken,
}

impl<S: LifecycleStore + 'static> SchedulerWorker<S> {
    /// Create a worker ticking at the scheduler's configured interval
    pub fn new(scheduler: Arc<Scheduler<S>>) -> Self {
        let interval = scheduler.config().sweep_interval();
        Self {
            scheduler,
            interval,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the tick interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Share an existing cancellation token, e.g. the server's shutdown token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the worker and any sweep in progress
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run until Ctrl+C
    ///
    /// A sweep in progress when the signal arrives stops at the next photo
    /// boundary.
    pub async fn run(&self) -> Result<(), SchedulerError> {
        let cancel = self.cancel.clone();
        let signal = tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => tracing::info!("Shutdown signal received, stopping scheduler"),
                        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
                    }
                    cancel.cancel();
                }
                _ = cancel.cancelled() => {}
            }
        });

        let result = self.run_until_cancelled().await;
        signal.abort();
        result
    }

    /// Run until the cancellation token fires
    pub async fn run_until_cancelled(&self) -> Result<(), SchedulerError> {
        self.scheduler.config().validate()?;

        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Scheduler worker started (interval: {:?})", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                _ = self.cancel.cancelled() => {
                    break;
                }
            }
        }

        let metrics = self.scheduler.metrics();
        tracing::info!("Scheduler stopped. Final metrics:\n{}", metrics.summary());
        Ok(())
    }

    /// Run a fixed number of cycles
    ///
    /// Stops early if the token is cancelled.
    pub async fn run_cycles(&self, cycles: usize) -> Result<(), SchedulerError> {
        self.scheduler.config().validate()?;

        let mut ticker = interval(self.interval);
        tracing::info!(
            "Scheduler worker started for {} cycles (interval: {:?})",
            cycles,
            self.interval
        );

        for cycle in 0..cycles {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.cancel.cancelled() => break,
            }
            tracing::debug!("Starting sweep cycle {}/{}", cycle + 1, cycles);
            self.run_once().await;
        }

        let metrics = self.scheduler.metrics();
        tracing::info!("Scheduler finished. Final metrics:\n{}", metrics.summary());
        Ok(())
    }

    async fn run_once(&self) -> Option<SweepReport> {
        match self.scheduler.sweep(&self.cancel).await {
            Ok(report) => {
                if !report.dry_run && !report.cancelled {
                    self.verify_ledger();
                }
                Some(report)
            }
            Err(SchedulerError::AlreadyRunning) => {
                tracing::debug!("Previous sweep still running, skipping tick");
                None
            }
            Err(e) => {
                tracing::error!("Sweep failed: {}", e);
                None
            }
        }
    }

    /// Reseed any owner whose ledger no longer matches its photos
    fn verify_ledger(&self) {
        match self.scheduler.engine().repair_ledger() {
            Ok(repaired) => {
                for drift in &repaired {
                    tracing::error!(
                        "Repaired ledger of owner {}: {} bytes cached, {} recomputed",
                        drift.owner_id,
                        drift.cached,
                        drift.expected
                    );
                }
            }
            Err(e) => tracing::error!("Ledger check failed: {}", e),
        }
    }
}
