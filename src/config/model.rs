// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::ManagerOptions;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [manager]
/// tick_interval = "1s"
/// job_start_sla = "15m"
/// max_attempts = 5
///
/// [flow.ingest]
/// group = "etl"
/// failure_option = "FINISH_RUNNING"
///
/// [flow.ingest.job.extract]
/// cmd = "echo extract"
///
/// [flow.ingest.job.load]
/// cmd = "echo load"
/// after = ["extract"]
/// ```
///
/// Use [`ConfigFile`] (via `TryFrom`) for the validated form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Control-loop settings from `[manager]`.
    #[serde(default)]
    pub manager: ManagerSection,

    /// All flows from `[flow.<name>]`, keyed by flow name.
    #[serde(default)]
    pub flow: BTreeMap<String, FlowConfig>,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub manager: ManagerSettings,
    pub flow: BTreeMap<String, FlowConfig>,
}

impl ConfigFile {
    /// Construct without running validation. Callers outside this module
    /// should go through `TryFrom<RawConfigFile>`.
    pub fn new_unchecked(manager: ManagerSettings, flow: BTreeMap<String, FlowConfig>) -> Self {
        Self { manager, flow }
    }
}

/// `[manager]` section, durations still as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct ManagerSection {
    #[serde(default = "default_tick_interval")]
    pub tick_interval: String,

    #[serde(default = "default_job_start_sla")]
    pub job_start_sla: String,

    /// Attempts per job, first run included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_state_store_dir")]
    pub state_store_dir: PathBuf,

    #[serde(default = "default_failed_dag_retention")]
    pub failed_dag_retention: String,

    /// Flow SLA for flows that do not set one; none when absent.
    #[serde(default)]
    pub default_flow_sla: Option<String>,
}

fn default_tick_interval() -> String {
    "1s".to_string()
}

fn default_job_start_sla() -> String {
    "15m".to_string()
}

fn default_max_attempts() -> u32 {
    crate::engine::DEFAULT_MAX_ATTEMPTS
}

fn default_state_store_dir() -> PathBuf {
    PathBuf::from(".flowdag/checkpoints")
}

fn default_failed_dag_retention() -> String {
    "7d".to_string()
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            job_start_sla: default_job_start_sla(),
            max_attempts: default_max_attempts(),
            state_store_dir: default_state_store_dir(),
            failed_dag_retention: default_failed_dag_retention(),
            default_flow_sla: None,
        }
    }
}

/// `[manager]` with every duration parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerSettings {
    pub tick_interval: Duration,
    pub state_store_dir: PathBuf,
    pub options: ManagerOptions,
}

/// `[flow.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Flow group; also used as the job group of every job in the flow.
    #[serde(default = "default_group")]
    pub group: String,

    /// `"FINISH_RUNNING"` (default) or `"FINISH_ALL_POSSIBLE"`.
    ///
    /// Kept as a string: a malformed value falls back to the default with a
    /// warning when the DAG is built.
    #[serde(default)]
    pub failure_option: Option<String>,

    /// Maximum lifetime of one execution of this flow, e.g. `"2h"`.
    #[serde(default)]
    pub flow_sla: Option<String>,

    /// Jobs of this flow, keyed by job name.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

fn default_group() -> String {
    "default".to_string()
}

/// `[flow.<name>.job.<job>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Shell command to run.
    pub cmd: String,

    /// Jobs of the same flow that must complete first.
    #[serde(default)]
    pub after: Vec<String>,

    /// Override of `[manager].job_start_sla` for this job.
    #[serde(default)]
    pub job_start_sla: Option<String>,
}
