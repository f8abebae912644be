//! Configuration file parsing for the server.
//!
//! Every section is optional; a missing file section falls back to the
//! defaults of the crate that owns it.

use serde::Deserialize;
use shoebox_engine::{EngineConfig, PolicyConfig, QuotaConfig, RetryConfig};
use shoebox_scheduler::SchedulerConfig;
use std::path::Path;
use thiserror::Error;

/// Server configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// A value the server cannot run with
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Full server configuration loaded from TOML
///
/// ```toml
/// [server]
/// bind_address = "127.0.0.1"
/// bind_port = 8080
///
/// [store]
/// path = "shoebox.db"
///
/// [quota]
/// default_limit_bytes = 0
///
/// [policy]
/// cold_cost_percent = 100
///
/// [scheduler]
/// sweep_interval_minutes = 1440
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    /// HTTP listener
    #[serde(default)]
    pub server: HttpConfig,

    /// Persistence
    #[serde(default)]
    pub store: StoreConfig,

    /// Default quota for owners without an explicit limit
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Lifecycle constants
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Retry budgets
    #[serde(default)]
    pub retry: RetryConfig,

    /// Scheduled sweeps
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Bind address (e.g., "127.0.0.1")
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Bind port (e.g., 8080)
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,
}

/// Persistence settings
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path, `:memory:` for a throwaway store
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    8080
}

fn default_store_path() -> String {
    "shoebox.db".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// In-memory store, defaults everywhere else
    pub fn in_memory() -> Self {
        ServerConfig {
            store: StoreConfig {
                path: ":memory:".to_string(),
            },
            ..Default::default()
        }
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine_config()
            .validate()
            .map_err(ConfigError::Invalid)?;
        self.scheduler
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Engine section of the configuration
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            policy: self.policy.clone(),
            retry: self.retry.clone(),
            quota: self.quota.clone(),
        }
    }

    /// Get the full bind address (address:port)
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
    }
}
