//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports TOML and JSON formats
//!
//! ## Environment Variables
//! - `PUNCHCLOCK_DB_PATH`: Database file path (required for env loading)
//! - `PUNCHCLOCK_DB_POOL_SIZE`: Connection pool size
//! - `PUNCHCLOCK_REPORTING_URL`: Reporting collaborator base URL (required)
//! - `PUNCHCLOCK_REPORTING_ENABLED`: Whether forwarding is enabled (true/false)
//! - `PUNCHCLOCK_REPORTING_TIMEOUT_SECS`: Per-request timeout in seconds
//! - `PUNCHCLOCK_OUTBOX_POLL_SECS`: Outbox poll interval in seconds
//! - `PUNCHCLOCK_OUTBOX_BATCH_SIZE`: Entries per outbox batch
//! - `PUNCHCLOCK_OUTBOX_MAX_RETRIES`: Delivery attempts before parking
//! - `PUNCHCLOCK_BIND_ADDR`: API bind address
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.toml` or `./config.json` (current working directory)
//! 2. `./punchclock.toml` or `./punchclock.json`
//! 3. `../config.toml` / `../punchclock.toml` (parent directory)

use std::path::{Path, PathBuf};

use punchclock_domain::{Config, Result, TimeclockError};
use tracing::{debug, info, warn};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If the required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `TimeclockError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            debug!(error = ?e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Like [`load`], but falls back to built-in defaults instead of failing
/// when neither source is available.
pub fn load_or_default() -> Config {
    match load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "No configuration found, using built-in defaults");
            Config::default()
        }
    }
}

/// Load configuration from environment variables.
///
/// `PUNCHCLOCK_DB_PATH` and `PUNCHCLOCK_REPORTING_URL` must be present;
/// everything else falls back to the defaults in the domain config.
///
/// # Errors
/// Returns `TimeclockError::Config` if required variables are missing or
/// have invalid values.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = env_var("PUNCHCLOCK_DB_PATH")?;
    config.reporting.base_url = env_var("PUNCHCLOCK_REPORTING_URL")?;

    if let Some(pool_size) = env_parse::<u32>("PUNCHCLOCK_DB_POOL_SIZE")? {
        config.database.pool_size = pool_size;
    }
    config.reporting.enabled = env_bool("PUNCHCLOCK_REPORTING_ENABLED", true);
    if let Some(timeout) = env_parse::<u64>("PUNCHCLOCK_REPORTING_TIMEOUT_SECS")? {
        config.reporting.timeout_seconds = timeout;
    }
    if let Some(poll) = env_parse::<u64>("PUNCHCLOCK_OUTBOX_POLL_SECS")? {
        config.reporting.poll_interval_seconds = poll;
    }
    if let Some(batch) = env_parse::<usize>("PUNCHCLOCK_OUTBOX_BATCH_SIZE")? {
        config.reporting.batch_size = batch;
    }
    if let Some(retries) = env_parse::<u32>("PUNCHCLOCK_OUTBOX_MAX_RETRIES")? {
        config.reporting.max_retries = retries;
    }
    if let Ok(bind) = std::env::var("PUNCHCLOCK_BIND_ADDR") {
        config.server.bind_addr = bind;
    }

    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both TOML and JSON formats (detected by file extension).
///
/// # Errors
/// Returns `TimeclockError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - The file fails to parse
pub fn load_from_file(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => {
            if !path.exists() {
                return Err(TimeclockError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => probe_config_paths().ok_or_else(|| {
            TimeclockError::Config("no config file found in probed locations".into())
        })?,
    };

    let raw = std::fs::read_to_string(&path).map_err(|err| {
        TimeclockError::Config(format!("failed to read {}: {err}", path.display()))
    })?;

    let config = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&raw).map_err(|err| {
            TimeclockError::Config(format!("invalid JSON in {}: {err}", path.display()))
        })?,
        _ => toml::from_str(&raw).map_err(|err| {
            TimeclockError::Config(format!("invalid TOML in {}: {err}", path.display()))
        })?,
    };

    info!(path = %path.display(), "Configuration loaded from file");
    Ok(config)
}

fn probe_config_paths() -> Option<PathBuf> {
    const CANDIDATES: [&str; 8] = [
        "config.toml",
        "config.json",
        "punchclock.toml",
        "punchclock.json",
        "../config.toml",
        "../config.json",
        "../punchclock.toml",
        "../punchclock.json",
    ];

    CANDIDATES.iter().map(PathBuf::from).find(|p| p.exists())
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| TimeclockError::Config(format!("missing environment variable {name}")))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| TimeclockError::Config(format!("invalid {name}: {err}"))),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map_or(default, |raw| matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}
