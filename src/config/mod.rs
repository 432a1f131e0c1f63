// src/config/mod.rs

//! Configuration loading and validation for flowdag.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate manager settings and flow DAGs (`validate.rs`).
//! - Compile flows into DAGs (`flows.rs`).

pub mod flows;
pub mod loader;
pub mod model;
pub mod validate;

pub use flows::{compile_all, compile_flow};
pub use loader::{default_config_path, load_and_validate, load_from_path, parse_and_validate};
pub use model::{ConfigFile, FlowConfig, JobConfig, ManagerSection, ManagerSettings, RawConfigFile};
