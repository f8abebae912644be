//! Shoebox Server
//!
//! HTTP surface of the lifecycle engine, plus the background scheduler.
//!
//! | Route | Effect |
//! |-------|--------|
//! | `POST /rulesets`, `PUT /rulesets/:id` | validate and store a rule set |
//! | `GET /rulesets/:id` | read a rule set |
//! | `POST /photos`, `GET /photos/:id` | register an upload, read a photo |
//! | `POST /photos/:id/freeze`, `/unfreeze` | freeze manager, returns the quota |
//! | `POST /photos/:id/release` | lift a quarantine |
//! | `GET`/`PUT /owners/:id/quota` | quota snapshot and limit |
//! | `POST /lifecycle/run` | one sweep now, optionally dry run |
//! | `POST /ledger/check` | compare the quota ledger with a recomputation |
//! | `GET /health` | liveness |

#![warn(missing_docs)]

pub mod config;
pub mod dto;
pub mod handlers;

use config::ServerConfig;
use handlers::{create_router, AppState};
use shoebox_domain::AuditSink;
use shoebox_engine::{FanoutAuditSink, InMemoryStorage, LifecycleEngine, TracingAuditSink};
use shoebox_scheduler::{Scheduler, SchedulerWorker};
use shoebox_store::SqliteStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Database could not be opened
    #[error("Store error: {0}")]
    Store(#[from] shoebox_store::StoreError),

    /// Engine error during startup
    #[error("Engine error: {0}")]
    Engine(#[from] shoebox_engine::LifecycleError),

    /// Server binding error
    #[error("Failed to bind server: {0}")]
    Bind(#[from] std::io::Error),

    /// Server error
    #[error("Server error: {0}")]
    Server(String),
}

/// Open the store and wire engine and scheduler
///
/// Audit events go both to the store's audit table and to the log. The
/// quota ledger is rebuilt from the store before anything is served.
pub fn build_state(config: &ServerConfig) -> Result<AppState, ServerError> {
    config.validate()?;

    let store = Arc::new(SqliteStore::new(&config.store.path)?);
    let audit: Vec<Arc<dyn AuditSink>> = vec![
        store.clone() as Arc<dyn AuditSink>,
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
    ];
    let engine = Arc::new(
        LifecycleEngine::new(
            store,
            Arc::new(InMemoryStorage::new()),
            &config.engine_config(),
        )?
        .with_audit_sink(Arc::new(FanoutAuditSink::new(audit))),
    );

    engine.rebuild_ledger()?;

    let scheduler = Arc::new(Scheduler::new(engine.clone(), config.scheduler.clone()));
    Ok(AppState {
        engine,
        scheduler,
        shutdown: CancellationToken::new(),
    })
}

/// Start the HTTP server and the background scheduler
///
/// Runs until Ctrl+C. Shutdown cancels any sweep in progress at the next
/// photo boundary.
pub async fn start_server(config: ServerConfig) -> Result<(), ServerError> {
    info!("Starting Shoebox lifecycle server");
    info!("Bind address: {}", config.bind_addr());
    info!("Store: {}", config.store.path);
    info!(
        "Sweep interval: {} minutes ({} workers{})",
        config.scheduler.sweep_interval_minutes,
        config.scheduler.worker_count,
        if config.scheduler.dry_run { ", dry run" } else { "" }
    );

    let state = build_state(&config)?;
    let shutdown = state.shutdown.clone();

    let worker = SchedulerWorker::new(state.scheduler.clone()).with_cancellation(shutdown.clone());
    let worker_task = tokio::spawn(async move { worker.run_until_cancelled().await });

    let app = create_router(state);
    let listener = TcpListener::bind(&config.bind_addr()).await?;
    info!("Server listening on {}", config.bind_addr());

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await
        .map_err(|e| ServerError::Server(e.to_string()))?;

    shutdown.cancel();
    match worker_task.await {
        Ok(result) => result.map_err(|e| ServerError::Server(e.to_string()))?,
        Err(e) => return Err(ServerError::Server(e.to_string())),
    }

    Ok(())
}
