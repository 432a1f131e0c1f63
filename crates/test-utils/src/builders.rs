#![allow(dead_code)]

use std::collections::BTreeMap;

use flowdag::config::{ConfigFile, FlowConfig, JobConfig, ManagerSection, RawConfigFile};
use flowdag::dag::{Dag, DagId, JobExecutionPlan, JobKey};

/// Build the test DAG used throughout the manager tests.
///
/// Flow group and job group are `group{id}`, flow name is `flow{id}`, jobs
/// are `job0..job{n-1}` with edges:
///
/// ```text
/// job0 -> job1 -> job3
///      -> job2 -> job4
/// ```
///
/// `num_nodes` must be between 1 and 5.
pub fn build_dag(id: &str, flow_execution_id: u64, failure_option: &str, num_nodes: usize) -> Dag {
    let plans = (0..num_nodes)
        .map(|i| {
            let plan = dag_plan(id, flow_execution_id, i).with_failure_option(failure_option);
            match i {
                1 | 2 => plan.after("job0"),
                3 => plan.after("job1"),
                4 => plan.after("job2"),
                _ => plan,
            }
        })
        .collect();
    Dag::from_plans(plans).expect("test DAG shape is valid")
}

/// Plan of `job{i}` in the flow built by [`build_dag`], without edges.
pub fn dag_plan(id: &str, flow_execution_id: u64, i: usize) -> JobExecutionPlan {
    let group = format!("group{id}");
    JobExecutionPlan::new(
        group.clone(),
        format!("flow{id}"),
        flow_execution_id,
        group,
        format!("job{i}"),
    )
}

pub fn dag_id(id: &str, flow_execution_id: u64) -> DagId {
    DagId::new(&format!("group{id}"), &format!("flow{id}"), flow_execution_id)
}

pub fn job_key(id: &str, flow_execution_id: u64, i: usize) -> JobKey {
    dag_plan(id, flow_execution_id, i).key()
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                manager: ManagerSection::default(),
                flow: BTreeMap::new(),
            },
        }
    }

    pub fn with_flow(mut self, name: &str, flow: FlowConfig) -> Self {
        self.config.flow.insert(name.to_string(), flow);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.manager.max_attempts = n;
        self
    }

    pub fn tick_interval(mut self, s: &str) -> Self {
        self.config.manager.tick_interval = s.to_string();
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `FlowConfig`.
pub struct FlowConfigBuilder {
    flow: FlowConfig,
}

impl FlowConfigBuilder {
    pub fn new(group: &str) -> Self {
        Self {
            flow: FlowConfig {
                group: group.to_string(),
                failure_option: None,
                flow_sla: None,
                job: BTreeMap::new(),
            },
        }
    }

    pub fn job(mut self, name: &str, cmd: &str) -> Self {
        self.flow.job.insert(
            name.to_string(),
            JobConfig {
                cmd: cmd.to_string(),
                after: vec![],
                job_start_sla: None,
            },
        );
        self
    }

    /// Add a dependency to an already added job.
    pub fn after(mut self, name: &str, dep: &str) -> Self {
        if let Some(job) = self.flow.job.get_mut(name) {
            job.after.push(dep.to_string());
        }
        self
    }

    pub fn failure_option(mut self, option: &str) -> Self {
        self.flow.failure_option = Some(option.to_string());
        self
    }

    pub fn flow_sla(mut self, sla: &str) -> Self {
        self.flow.flow_sla = Some(sla.to_string());
        self
    }

    pub fn build(self) -> FlowConfig {
        self.flow
    }
}
