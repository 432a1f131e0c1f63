// src/config/flows.rs

//! Turn configured flows into runnable DAGs.

use crate::config::model::{ConfigFile, FlowConfig};
use crate::dag::{Dag, JobExecutionPlan};
use crate::errors::Result;

/// Build the DAG of one execution of flow `name`.
///
/// Every job inherits the flow's group, failure option and flow SLA; the
/// execution id is normally the trigger time in epoch millis.
pub fn compile_flow(name: &str, flow: &FlowConfig, flow_execution_id: u64) -> Result<Dag> {
    let plans = flow
        .job
        .iter()
        .map(|(job, cfg)| {
            let mut plan =
                JobExecutionPlan::new(&flow.group, name, flow_execution_id, &flow.group, job)
                    .with_command(&cfg.cmd);
            plan.dependencies = cfg.after.clone();
            plan.failure_option = flow.failure_option.clone();
            plan.flow_sla = flow.flow_sla.clone();
            plan.job_start_sla = cfg.job_start_sla.clone();
            plan
        })
        .collect();

    Ok(Dag::from_plans(plans)?)
}

/// One DAG per configured flow, all sharing `flow_execution_id`.
pub fn compile_all(cfg: &ConfigFile, flow_execution_id: u64) -> Result<Vec<Dag>> {
    cfg.flow
        .iter()
        .map(|(name, flow)| compile_flow(name, flow, flow_execution_id))
        .collect()
}
