// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, FlowConfig, ManagerSection, ManagerSettings, RawConfigFile};
use crate::engine::ManagerOptions;
use crate::errors::{FlowdagError, Result};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = FlowdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_flows(&raw)?;
        let manager = validate_manager(&raw.manager)?;
        for (name, flow) in raw.flow.iter() {
            validate_flow(name, flow)?;
        }
        Ok(ConfigFile::new_unchecked(manager, raw.flow))
    }
}

fn ensure_has_flows(cfg: &RawConfigFile) -> Result<()> {
    if cfg.flow.is_empty() {
        return Err(FlowdagError::ConfigError(
            "config must contain at least one [flow.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_manager(section: &ManagerSection) -> Result<ManagerSettings> {
    if section.max_attempts == 0 {
        return Err(FlowdagError::ConfigError(
            "[manager].max_attempts must be >= 1 (got 0)".to_string(),
        ));
    }

    let tick_interval = manager_duration("tick_interval", &section.tick_interval)?;
    if tick_interval.is_zero() {
        return Err(FlowdagError::ConfigError(
            "[manager].tick_interval must be greater than zero".to_string(),
        ));
    }

    let default_flow_sla = section
        .default_flow_sla
        .as_deref()
        .map(|s| manager_duration("default_flow_sla", s))
        .transpose()?;

    Ok(ManagerSettings {
        tick_interval,
        state_store_dir: section.state_store_dir.clone(),
        options: ManagerOptions {
            job_start_sla: manager_duration("job_start_sla", &section.job_start_sla)?,
            max_attempts: section.max_attempts,
            failed_dag_retention: manager_duration(
                "failed_dag_retention",
                &section.failed_dag_retention,
            )?,
            default_flow_sla,
        },
    })
}

fn manager_duration(key: &str, value: &str) -> Result<std::time::Duration> {
    parse_duration(value)
        .map_err(|e| FlowdagError::ConfigError(format!("[manager].{key}: {e}")))
}

fn validate_flow(name: &str, flow: &FlowConfig) -> Result<()> {
    if flow.job.is_empty() {
        return Err(FlowdagError::ConfigError(format!(
            "flow '{name}' must contain at least one [flow.{name}.job.<name>] section"
        )));
    }

    for (job, cfg) in flow.job.iter() {
        for dep in cfg.after.iter() {
            if !flow.job.contains_key(dep) {
                return Err(FlowdagError::ConfigError(format!(
                    "job '{}' of flow '{}' has unknown dependency '{}' in `after`",
                    job, name, dep
                )));
            }
            if dep == job {
                return Err(FlowdagError::ConfigError(format!(
                    "job '{}' of flow '{}' cannot depend on itself in `after`",
                    job, name
                )));
            }
        }
    }

    // Edge direction: dep -> job.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for job in flow.job.keys() {
        graph.add_node(job.as_str());
    }
    for (job, cfg) in flow.job.iter() {
        for dep in cfg.after.iter() {
            graph.add_edge(dep.as_str(), job.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(FlowdagError::DagCycle(format!(
            "cycle detected in flow '{}' involving job '{}'",
            name,
            cycle.node_id()
        ))),
    }
}
