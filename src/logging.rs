// src/logging.rs

//! Logging setup for `flowdag` using `tracing` + `tracing-subscriber`.
//!
//! The level comes from `--log-level`, then `FLOWDAG_LOG`, then `info`.
//! Output goes to stderr; stdout is reserved for `--dry-run` listings.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

/// Environment variable consulted when `--log-level` is absent.
pub const LOG_ENV_VAR: &str = "FLOWDAG_LOG";

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env_value = std::env::var(LOG_ENV_VAR).ok();
    let level = resolve_level(cli_level, env_value.as_deref());

    fmt()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing tracing subscriber: {e}"))
}

/// Unknown values in the environment fall back to `info`.
fn resolve_level(cli_level: Option<LogLevel>, env_value: Option<&str>) -> Level {
    if let Some(level) = cli_level {
        return level.into();
    }
    env_value
        .map(|v| v.trim().to_ascii_lowercase())
        .and_then(|v| match v.as_str() {
            "warning" => Some(Level::WARN),
            other => other.parse().ok(),
        })
        .unwrap_or(Level::INFO)
}
