//! Shoebox Scheduler
//!
//! Periodic lifecycle sweeps over every owner's photos.
//!
//! # Overview
//!
//! The scheduler is responsible for:
//! - **Resolving**: working out the governing action of each live photo
//! - **Applying**: handing transitions to the engine's state machine
//! - **Isolating failures**: a conflict, backend outage or integrity failure
//!   affects only the photo that hit it
//! - **Metrics collection**: per-sweep reports and cumulative counters
//!
//! # Architecture
//!
//! A sweep partitions work by owner. Up to `worker_count` partitions run at
//! once; photos within a partition are processed in order. Sweeps are
//! stateless: each one re-derives what every photo is due from its age and
//! the owner's rule sets, so a missed run heals itself on the next one and a
//! photo that crossed several thresholds moves straight to the furthest.
//!
//! # Usage
//!
//! ## One-time Sweep
//!
//! ```no_run
//! use shoebox_engine::{EngineConfig, InMemoryStorage, LifecycleEngine};
//! use shoebox_scheduler::{Scheduler, SchedulerConfig};
//! use shoebox_store::SqliteStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::new("shoebox.db")?);
//! let engine = LifecycleEngine::new(store, Arc::new(InMemoryStorage::new()), &EngineConfig::default())?;
//! let scheduler = Scheduler::new(Arc::new(engine), SchedulerConfig::default());
//!
//! let report = scheduler.sweep(&CancellationToken::new()).await?;
//! println!("{} transitions", report.total_transitions());
//! println!("{}", scheduler.metrics().summary());
//! # Ok(())
//! # }
//! ```
//!
//! ## Dry Run
//!
//! `sweep_with(true, ..)` logs each intended transition with a `DRY RUN:`
//! prefix and returns it in [`OwnerReport::planned`] without committing.
//!
//! # Configuration
//!
//! ```toml
//! [scheduler]
//! sweep_interval_minutes = 1440
//! worker_count = 4
//! dry_run = false
//! ```

#![warn(missing_docs)]

mod config;
mod error;
mod metrics;
mod scheduler;
mod worker;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use metrics::{OwnerReport, PlannedTransition, SweepMetrics, SweepReport};
pub use scheduler::Scheduler;
pub use worker::SchedulerWorker;
