//! Shoebox Lifecycle Engine
//!
//! Applies lifecycle decisions to photos while keeping every owner's quota
//! ledger equal to a recomputation from photo state.
//!
//! # Overview
//!
//! - **Photo state machine**: [`LifecycleEngine::apply`] moves a photo
//!   Standard → Cold → Deleted (or straight to Deleted), never backwards
//! - **Freeze manager**: [`LifecycleEngine::freeze`] and
//!   [`LifecycleEngine::unfreeze`], with the re-freeze cooldown
//! - **Quota ledger**: [`QuotaLedger`], per-owner `used_space` counters
//! - **Storage collaborator**: [`StorageBackend`], called with a timeout and
//!   exponential backoff before any tier change is committed
//!
//! # Concurrency
//!
//! Every photo write is a compare-and-swap on `Photo::version`. The ledger
//! delta of a write is applied under the ledger lock in the same critical
//! section as the swap, so a lost race changes nothing. Freeze, unfreeze and
//! quarantine updates re-read and retry on conflict with a bounded budget;
//! `apply` reports `Conflict` and leaves the retry to the scheduler, which
//! must re-resolve the fresh photo anyway.
//!
//! # Usage
//!
//! ```no_run
//! use shoebox_domain::GoverningAction;
//! use shoebox_engine::{EngineConfig, InMemoryStorage, LifecycleEngine};
//! use shoebox_store::SqliteStore;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::new(":memory:")?);
//! let engine = LifecycleEngine::new(store, Arc::new(InMemoryStorage::new()), &EngineConfig::default())?;
//!
//! let photo = engine.register_upload(shoebox_domain::OwnerId::new(), 4_000_000, 20_000, [])?;
//! let snapshot = engine.freeze(photo.id).await?;
//! println!("{} bytes used", snapshot.used_space);
//!
//! let photo = engine.get_photo(photo.id)?;
//! engine.apply(&photo, GoverningAction::MoveToColdTier, None).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod audit;
mod config;
mod engine;
mod error;
mod ledger;
mod retry;
mod storage;

pub use audit::{FanoutAuditSink, MemoryAuditSink, TracingAuditSink};
pub use config::{EngineConfig, PolicyConfig, QuotaConfig, RetryConfig};
pub use engine::{LedgerDrift, LifecycleEngine};
pub use error::LifecycleError;
pub use ledger::{weighted_usage, Charge, QuotaLedger, QuotaSnapshot};
pub use retry::with_storage_retry;
pub use storage::{InMemoryStorage, StorageBackend, StorageError};
