//! Configuration for scheduled sweeps

use crate::SchedulerError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the lifecycle scheduler
///
/// # Examples
///
/// ```
/// use shoebox_scheduler::SchedulerConfig;
///
/// // Default configuration (daily, 4 workers)
/// let config = SchedulerConfig::default();
/// assert_eq!(config.sweep_interval_minutes, 1440);
///
/// // Hourly sweeps with more parallelism
/// let config = SchedulerConfig::frequent();
/// assert_eq!(config.worker_count, 8);
///
/// // Single worker, logs intended transitions only
/// let config = SchedulerConfig::conservative();
/// assert!(config.dry_run);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often to run the sweep (in minutes)
    /// Default: 1440 (daily)
    #[serde(default = "default_interval")]
    pub sweep_interval_minutes: u64,

    /// Owner partitions processed in parallel
    /// Default: 4
    #[serde(default = "default_workers")]
    pub worker_count: usize,

    /// Dry-run mode: log intended transitions without committing them
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,
}

fn default_interval() -> u64 {
    1440
}

fn default_workers() -> usize {
    4
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_minutes: default_interval(),
            worker_count: default_workers(),
            dry_run: false,
        }
    }
}

impl SchedulerConfig {
    /// Hourly sweeps, 8 workers
    ///
    /// For deployments where rule thresholds should take effect within the
    /// hour of being crossed.
    pub fn frequent() -> Self {
        Self {
            sweep_interval_minutes: 60,
            worker_count: 8,
            dry_run: false,
        }
    }

    /// Daily sweeps, one worker, dry run
    ///
    /// For verifying a new rule configuration before letting it act.
    pub fn conservative() -> Self {
        Self {
            sweep_interval_minutes: 1440,
            worker_count: 1,
            dry_run: true,
        }
    }

    /// Get sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes * 60)
    }

    /// Reject values the worker cannot run with
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.sweep_interval_minutes == 0 {
            return Err(SchedulerError::Config(
                "sweep_interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(SchedulerError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
