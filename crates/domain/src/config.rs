//! Application configuration structures.
//!
//! Loading (environment variables, file probing) lives in the infra crate;
//! this module only defines the shape and the defaults.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BIND_ADDR, DEFAULT_DB_POOL_SIZE, DEFAULT_OUTBOX_BATCH_SIZE, DEFAULT_OUTBOX_MAX_RETRIES,
    DEFAULT_OUTBOX_POLL_SECS, DEFAULT_REPORT_TIMEOUT_SECS,
};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reporting: ReportingConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            reporting: ReportingConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// SQLite ledger store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: String,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "punchclock.db".into(), pool_size: DEFAULT_DB_POOL_SIZE }
    }
}

/// Outbound reporting (external project-management API) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportingConfig {
    /// Base URL of the reporting collaborator.
    pub base_url: String,
    /// Whether the outbox worker forwards entries at all.
    pub enabled: bool,
    /// Per-request timeout, seconds. Kept in the low single digits so a
    /// slow collaborator cannot stall the worker loop.
    pub timeout_seconds: u64,
    /// Outbox poll interval, seconds.
    pub poll_interval_seconds: u64,
    /// Maximum entries processed per poll.
    pub batch_size: usize,
    /// Attempts before an entry is marked permanently failed.
    pub max_retries: u32,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".into(),
            enabled: true,
            timeout_seconds: DEFAULT_REPORT_TIMEOUT_SECS,
            poll_interval_seconds: DEFAULT_OUTBOX_POLL_SECS,
            batch_size: DEFAULT_OUTBOX_BATCH_SIZE,
            max_retries: DEFAULT_OUTBOX_MAX_RETRIES,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Socket address the API binds to.
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: DEFAULT_BIND_ADDR.into() }
    }
}
