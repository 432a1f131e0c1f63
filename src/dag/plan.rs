// src/dag/plan.rs

//! Job-execution plans and the identifiers derived from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of one flow execution.
///
/// Formatted as `{flow_group}_{flow_name}_{flow_execution_id}`; used as the
/// checkpoint key and as the key of all per-flow bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DagId(String);

impl DagId {
    pub fn new(flow_group: &str, flow_name: &str, flow_execution_id: u64) -> Self {
        DagId(format!("{flow_group}_{flow_name}_{flow_execution_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DagId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DagId {
    fn from(s: &str) -> Self {
        DagId(s.to_string())
    }
}

impl From<String> for DagId {
    fn from(s: String) -> Self {
        DagId(s)
    }
}

/// Value identity of a job execution: its flow coordinates plus job group
/// and job name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobKey {
    pub flow_group: String,
    pub flow_name: String,
    pub flow_execution_id: u64,
    pub job_group: String,
    pub job_name: String,
}

/// Job group and name of the flow-level status entry of a flow execution.
pub const FLOW_LEVEL_JOB: &str = "NA_KEY";

impl JobKey {
    pub fn dag_id(&self) -> DagId {
        DagId::new(&self.flow_group, &self.flow_name, self.flow_execution_id)
    }

    /// Key of the status entry describing the whole flow execution rather
    /// than one of its jobs.
    pub fn flow_level(&self) -> JobKey {
        JobKey {
            flow_group: self.flow_group.clone(),
            flow_name: self.flow_name.clone(),
            flow_execution_id: self.flow_execution_id,
            job_group: FLOW_LEVEL_JOB.to_string(),
            job_name: FLOW_LEVEL_JOB.to_string(),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}:{}/{}",
            self.flow_group, self.flow_name, self.flow_execution_id, self.job_group, self.job_name
        )
    }
}

/// Everything needed to run one job of a flow execution.
///
/// Plans are produced by the flow compiler. Optional string settings
/// (`failure_option`, `flow_sla`, `job_start_sla`) are kept raw and
/// interpreted where they are used, so a malformed value degrades to a
/// default instead of rejecting the whole flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobExecutionPlan {
    pub flow_group: String,
    pub flow_name: String,
    pub flow_execution_id: u64,
    pub job_group: String,
    pub job_name: String,

    /// Names of jobs in the same flow that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Executor target (e.g. `"local"` or a cluster URI).
    #[serde(default = "default_executor")]
    pub executor: String,

    /// `FINISH_RUNNING` or `FINISH_ALL_POSSIBLE`.
    #[serde(default)]
    pub failure_option: Option<String>,

    /// Maximum lifetime of the whole flow execution, e.g. `"2h"`.
    #[serde(default)]
    pub flow_sla: Option<String>,

    /// Override for the start SLA of this job, e.g. `"5m"`.
    #[serde(default)]
    pub job_start_sla: Option<String>,

    /// Shell command for executors that run jobs locally.
    #[serde(default)]
    pub command: Option<String>,
}

fn default_executor() -> String {
    "local".to_string()
}

impl JobExecutionPlan {
    pub fn new(
        flow_group: impl Into<String>,
        flow_name: impl Into<String>,
        flow_execution_id: u64,
        job_group: impl Into<String>,
        job_name: impl Into<String>,
    ) -> Self {
        Self {
            flow_group: flow_group.into(),
            flow_name: flow_name.into(),
            flow_execution_id,
            job_group: job_group.into(),
            job_name: job_name.into(),
            dependencies: Vec::new(),
            executor: default_executor(),
            failure_option: None,
            flow_sla: None,
            job_start_sla: None,
            command: None,
        }
    }

    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    pub fn with_failure_option(mut self, option: impl Into<String>) -> Self {
        self.failure_option = Some(option.into());
        self
    }

    pub fn with_flow_sla(mut self, sla: impl Into<String>) -> Self {
        self.flow_sla = Some(sla.into());
        self
    }

    pub fn with_job_start_sla(mut self, sla: impl Into<String>) -> Self {
        self.job_start_sla = Some(sla.into());
        self
    }

    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        self.command = Some(cmd.into());
        self
    }

    pub fn with_executor(mut self, executor: impl Into<String>) -> Self {
        self.executor = executor.into();
        self
    }

    pub fn key(&self) -> JobKey {
        JobKey {
            flow_group: self.flow_group.clone(),
            flow_name: self.flow_name.clone(),
            flow_execution_id: self.flow_execution_id,
            job_group: self.job_group.clone(),
            job_name: self.job_name.clone(),
        }
    }

    pub fn dag_id(&self) -> DagId {
        DagId::new(&self.flow_group, &self.flow_name, self.flow_execution_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dag_id_is_derived_from_flow_coordinates() {
        let plan = JobExecutionPlan::new("group0", "flow0", 42, "group0", "job0");
        assert_eq!(plan.dag_id().as_str(), "group0_flow0_42");
        assert_eq!(plan.key().dag_id(), plan.dag_id());
    }

    #[test]
    fn job_keys_compare_by_value() {
        let a = JobExecutionPlan::new("g", "f", 1, "g", "job0").key();
        let b = JobExecutionPlan::new("g", "f", 1, "g", "job0")
            .with_command("echo hi")
            .key();
        let other_run = JobExecutionPlan::new("g", "f", 2, "g", "job0").key();
        assert_eq!(a, b);
        assert_ne!(a, other_run);
    }
}
