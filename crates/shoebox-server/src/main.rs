//! Shoebox CLI
//!
//! Runs the lifecycle server, a one-off sweep, or a ledger consistency check.

use anyhow::Context;
use clap::{Parser, Subcommand};
use shoebox_domain::LifecycleStore;
use shoebox_server::{build_state, config::ServerConfig, start_server};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Shoebox storage lifecycle engine
#[derive(Debug, Parser)]
#[command(name = "shoebox")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "SHOEBOX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the HTTP API and run scheduled sweeps
    Serve,

    /// Run one lifecycle sweep and exit
    Sweep {
        /// Log intended transitions without committing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Report every owner's quota usage and verify it against the photos
    CheckLedger {
        /// Overwrite drifted entries with the recomputed value
        #[arg(long)]
        repair: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ServerConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            tracing::warn!("No config file specified, using defaults");
            ServerConfig::default()
        }
    };

    match cli.command {
        Command::Serve => start_server(config).await?,
        Command::Sweep { dry_run } => sweep(&config, dry_run).await?,
        Command::CheckLedger { repair } => check_ledger(&config, repair)?,
    }

    Ok(())
}

async fn sweep(config: &ServerConfig, dry_run: bool) -> anyhow::Result<()> {
    let state = build_state(config)?;

    let shutdown = state.shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.cancel();
        }
    });

    let report = state
        .scheduler
        .sweep_with(dry_run || config.scheduler.dry_run, &state.shutdown)
        .await?;

    for owner in &report.owners {
        println!(
            "{}: {} examined, {} transitions, {} planned, {} deferred, {} quarantined, {} failed",
            owner.owner_id,
            owner.examined,
            owner.total_transitions(),
            owner.planned.len(),
            owner.deferred,
            owner.quarantined,
            owner.failed
        );
    }
    println!("\n{}", state.scheduler.metrics().summary());
    Ok(())
}

fn check_ledger(config: &ServerConfig, repair: bool) -> anyhow::Result<()> {
    let state = build_state(config)?;
    let engine = &state.engine;

    for owner_id in engine.store().owners()? {
        let snapshot = engine.quota_snapshot(owner_id)?;
        let limit = match snapshot.quota_limit {
            0 => "unlimited".to_string(),
            limit => format!("{} bytes", limit),
        };
        println!("{}: {} bytes used of {}", owner_id, snapshot.used_space, limit);
    }

    let drift = if repair {
        engine.repair_ledger()?
    } else {
        engine.check_ledger()?
    };

    if drift.is_empty() {
        println!("Ledger consistent");
        return Ok(());
    }

    for entry in &drift {
        println!(
            "{}: ledger {} bytes, recomputed {} bytes{}",
            entry.owner_id,
            entry.cached,
            entry.expected,
            if repair { " (repaired)" } else { "" }
        );
    }
    if !repair {
        anyhow::bail!("{} owners drifted; rerun with --repair", drift.len());
    }
    Ok(())
}
