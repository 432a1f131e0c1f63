// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::dag::DagError;

#[derive(Error, Debug)]
pub enum FlowdagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid DAG: {0}")]
    Dag(#[from] DagError),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Checkpoint encoding error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Status retrieval failed for {job}: {reason}")]
    Retriever { job: String, reason: String },

    #[error("Executor error: {0}")]
    Executor(String),

    /// Internal bookkeeping disagreed with itself. Fatal for the affected DAG
    /// during the current tick only.
    #[error("Invariant violated for DAG {dag_id}: {reason}")]
    Invariant { dag_id: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowdagError {
    pub fn invariant(dag_id: impl ToString, reason: impl Into<String>) -> Self {
        FlowdagError::Invariant {
            dag_id: dag_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, FlowdagError>;
