// src/engine/mod.rs

//! Orchestration engine for flowdag.
//!
//! - [`queues`] carries new DAGs and cancel/resume requests to the manager.
//! - [`manager`] holds the synchronous per-tick control loop. It performs
//!   no async IO itself and is driven directly in tests.
//! - [`runtime`] is the async shell that ticks the manager on a fixed
//!   delay until shutdown.

use std::time::Duration;

pub mod manager;
pub mod queues;
pub mod runtime;

pub use manager::DagManager;
pub use queues::{channels, DagManagerHandle, ManagerInbox};
pub use runtime::{Runtime, RuntimeOptions};

/// Default time a submitted job may take to start running.
pub const DEFAULT_JOB_START_SLA: Duration = Duration::from_secs(15 * 60);

/// Default number of attempts per job, first run included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default time failed DAGs stay resumable.
pub const DEFAULT_FAILED_DAG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tunables of the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    pub job_start_sla: Duration,
    pub max_attempts: u32,
    pub failed_dag_retention: Duration,
    /// Flow SLA applied to DAGs whose plans do not carry one.
    pub default_flow_sla: Option<Duration>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            job_start_sla: DEFAULT_JOB_START_SLA,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            failed_dag_retention: DEFAULT_FAILED_DAG_RETENTION,
            default_flow_sla: None,
        }
    }
}

/// Lifetime counters of a [`DagManager`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DagManagerStats {
    pub dags_succeeded: u64,
    pub dags_failed: u64,
    pub jobs_submitted: u64,
    pub retries: u64,
    pub sla_kills: u64,
}

/// What one tick did, for logging by the shell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub dags_added: usize,
    pub jobs_polled: usize,
    pub dags_finished: usize,
}
