// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` default functions).
/// - Checks `[manager]` durations and limits, unknown `after` references
///   and cycles in every flow.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// Parse and validate configuration held in memory.
pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    let raw_config: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw_config)
}

/// Config file used when `--config` is not given.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Flowdag.toml")
}
