//! Error types for scheduler operations

use thiserror::Error;

/// Errors that can occur while sweeping
///
/// Per-photo failures never surface here; they are counted in the sweep
/// report and recorded in the audit sink.
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// Another sweep holds the run lock
    #[error("A sweep is already running")]
    AlreadyRunning,

    /// Listing owners failed before any partition started
    #[error("Storage error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker error (tokio runtime issues)
    #[error("Worker error: {0}")]
    Worker(String),
}
