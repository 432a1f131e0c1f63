// src/dag/graph.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;
use tracing::warn;

use crate::dag::plan::{DagId, JobExecutionPlan, JobKey};
use crate::types::{ExecutionStatus, FailureOption};

/// Reasons a list of plans cannot form a DAG.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    #[error("a DAG needs at least one job")]
    Empty,

    #[error("job '{0}' appears more than once")]
    DuplicateJob(String),

    #[error("job '{job}' depends on unknown job '{dependency}'")]
    UnknownDependency { job: String, dependency: String },

    #[error("job '{job}' belongs to flow {found}, expected {expected}")]
    MixedFlows {
        job: String,
        expected: DagId,
        found: DagId,
    },

    #[error("cycle detected in job DAG involving job '{0}'")]
    Cycle(String),
}

/// One job execution inside a [`Dag`]: the immutable plan plus the mutable
/// bookkeeping the DAG manager updates as the job progresses.
#[derive(Debug, Clone, PartialEq)]
pub struct DagNode {
    plan: JobExecutionPlan,
    key: JobKey,
    current_attempts: u32,
    orchestrated_at: Option<u64>,
    status: ExecutionStatus,
    seen_running: bool,
}

impl DagNode {
    pub fn new(plan: JobExecutionPlan) -> Self {
        let key = plan.key();
        Self {
            plan,
            key,
            current_attempts: 0,
            orchestrated_at: None,
            status: ExecutionStatus::Pending,
            seen_running: false,
        }
    }

    /// Rebuild a node from persisted state.
    pub fn restore(
        plan: JobExecutionPlan,
        current_attempts: u32,
        orchestrated_at: Option<u64>,
        status: ExecutionStatus,
        seen_running: bool,
    ) -> Self {
        let key = plan.key();
        Self {
            plan,
            key,
            current_attempts,
            orchestrated_at,
            status,
            seen_running,
        }
    }

    pub fn plan(&self) -> &JobExecutionPlan {
        &self.plan
    }

    pub fn key(&self) -> &JobKey {
        &self.key
    }

    pub fn job_name(&self) -> &str {
        &self.plan.job_name
    }

    pub fn current_attempts(&self) -> u32 {
        self.current_attempts
    }

    pub fn orchestrated_at(&self) -> Option<u64> {
        self.orchestrated_at
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn seen_running(&self) -> bool {
        self.seen_running
    }

    /// Stamp a new submission of this node.
    pub fn mark_orchestrated(&mut self, now_millis: u64) {
        self.orchestrated_at = Some(now_millis);
        self.status = ExecutionStatus::Orchestrated;
        self.seen_running = false;
    }

    pub fn mark_running(&mut self) {
        self.status = ExecutionStatus::Running;
        self.seen_running = true;
    }

    pub fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
    }

    pub fn reset_attempts(&mut self) {
        self.current_attempts = 1;
    }

    /// Bump the attempt counter and return the new value.
    pub fn increment_attempts(&mut self) -> u32 {
        self.current_attempts += 1;
        self.current_attempts
    }
}

/// Graph of job nodes for one flow execution.
///
/// The shape is fixed at construction; edges are inferred from each plan's
/// `dependencies`. Nodes keep the order of the plans they were built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Dag {
    id: DagId,
    failure_option: FailureOption,
    nodes: Vec<DagNode>,
    index: HashMap<String, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
}

impl Dag {
    /// Build a DAG from freshly compiled plans.
    pub fn from_plans(plans: Vec<JobExecutionPlan>) -> Result<Self, DagError> {
        Self::from_nodes(plans.into_iter().map(DagNode::new).collect())
    }

    /// Build a DAG from nodes that may already carry progress (checkpoints).
    pub fn from_nodes(nodes: Vec<DagNode>) -> Result<Self, DagError> {
        let first = nodes.first().ok_or(DagError::Empty)?;
        let id = first.plan.dag_id();
        let failure_option = resolve_failure_option(&id, first.plan.failure_option.as_deref());

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            let node_dag = node.plan.dag_id();
            if node_dag != id {
                return Err(DagError::MixedFlows {
                    job: node.job_name().to_string(),
                    expected: id,
                    found: node_dag,
                });
            }
            if index.insert(node.job_name().to_string(), i).is_some() {
                return Err(DagError::DuplicateJob(node.job_name().to_string()));
            }
        }

        let mut parents = vec![Vec::new(); nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];
        for (i, node) in nodes.iter().enumerate() {
            for dep in node.plan.dependencies.iter() {
                let &p = index.get(dep).ok_or_else(|| DagError::UnknownDependency {
                    job: node.job_name().to_string(),
                    dependency: dep.clone(),
                })?;
                if !parents[i].contains(&p) {
                    parents[i].push(p);
                    children[p].push(i);
                }
            }
        }

        ensure_acyclic(&nodes, &parents)?;

        Ok(Self {
            id,
            failure_option,
            nodes,
            index,
            parents,
            children,
        })
    }

    pub fn id(&self) -> &DagId {
        &self.id
    }

    pub fn failure_option(&self) -> FailureOption {
        self.failure_option
    }

    /// Raw flow SLA setting of this flow, taken from its first plan.
    pub fn flow_sla(&self) -> Option<&str> {
        self.nodes.first().and_then(|n| n.plan.flow_sla.as_deref())
    }

    /// Flow execution id shared by every node (epoch millis of the trigger).
    pub fn flow_execution_id(&self) -> u64 {
        self.nodes
            .first()
            .map(|n| n.plan.flow_execution_id)
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> &[DagNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes without dependencies.
    pub fn start_nodes(&self) -> Vec<&DagNode> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.parents[*i].is_empty())
            .map(|(_, n)| n)
            .collect()
    }

    /// Nodes nothing depends on.
    pub fn end_nodes(&self) -> Vec<&DagNode> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| self.children[*i].is_empty())
            .map(|(_, n)| n)
            .collect()
    }

    pub fn node(&self, job_name: &str) -> Option<&DagNode> {
        self.index.get(job_name).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, job_name: &str) -> Option<&mut DagNode> {
        self.index.get(job_name).map(|&i| &mut self.nodes[i])
    }

    /// Look a node up by full key; `None` if the key belongs to another flow
    /// execution or job group.
    pub fn node_by_key(&self, key: &JobKey) -> Option<&DagNode> {
        self.node(&key.job_name).filter(|n| &n.key == key)
    }

    pub fn node_by_key_mut(&mut self, key: &JobKey) -> Option<&mut DagNode> {
        self.node_mut(&key.job_name).filter(|n| &n.key == key)
    }

    /// Direct dependents of `job_name`.
    pub fn dependents_of(&self, job_name: &str) -> Vec<&DagNode> {
        self.index
            .get(job_name)
            .map(|&i| self.children[i].iter().map(|&c| &self.nodes[c]).collect())
            .unwrap_or_default()
    }

    /// Direct dependencies of `job_name`.
    pub fn dependencies_of(&self, job_name: &str) -> Vec<&DagNode> {
        self.index
            .get(job_name)
            .map(|&i| self.parents[i].iter().map(|&p| &self.nodes[p]).collect())
            .unwrap_or_default()
    }

    /// Whether every dependency of `job_name` has completed.
    pub fn dependencies_complete(&self, job_name: &str) -> bool {
        self.dependencies_of(job_name)
            .iter()
            .all(|d| d.status == ExecutionStatus::Complete)
    }

    /// Dependents of `job_name` that have not started and whose dependencies
    /// are now all complete.
    pub fn ready_dependents(&self, job_name: &str) -> Vec<String> {
        self.dependents_of(job_name)
            .into_iter()
            .filter(|child| child.status == ExecutionStatus::Pending)
            .filter(|child| self.dependencies_complete(child.job_name()))
            .map(|child| child.job_name().to_string())
            .collect()
    }

    /// Nodes that have not started but could start now.
    pub fn startable_nodes(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|n| n.status == ExecutionStatus::Pending)
            .filter(|n| self.dependencies_complete(n.job_name()))
            .map(|n| n.job_name().to_string())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.nodes
            .iter()
            .all(|n| n.status == ExecutionStatus::Complete)
    }

    pub fn has_failures(&self) -> bool {
        self.nodes.iter().any(|n| n.status.is_failure())
    }
}

fn resolve_failure_option(dag_id: &DagId, raw: Option<&str>) -> FailureOption {
    match raw {
        None => FailureOption::default(),
        Some(s) => s.parse().unwrap_or_else(|err: String| {
            warn!(
                dag_id = %dag_id,
                error = %err,
                "malformed failure option; falling back to FINISH_RUNNING"
            );
            FailureOption::default()
        }),
    }
}

fn ensure_acyclic(nodes: &[DagNode], parents: &[Vec<usize>]) -> Result<(), DagError> {
    // Edge direction: dependency -> dependent.
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in 0..nodes.len() {
        graph.add_node(i);
    }
    for (i, deps) in parents.iter().enumerate() {
        for &p in deps {
            graph.add_edge(p, i, ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DagError::Cycle(
            nodes[cycle.node_id()].job_name().to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(job: &str) -> JobExecutionPlan {
        JobExecutionPlan::new("group0", "flow0", 7, "group0", job)
    }

    fn diamond() -> Dag {
        Dag::from_plans(vec![
            plan("a"),
            plan("b").after("a"),
            plan("c").after("a"),
            plan("d").after("b").after("c"),
        ])
        .unwrap()
    }

    #[test]
    fn infers_start_and_end_nodes() {
        let dag = diamond();
        let starts: Vec<_> = dag.start_nodes().iter().map(|n| n.job_name()).collect();
        let ends: Vec<_> = dag.end_nodes().iter().map(|n| n.job_name()).collect();
        assert_eq!(starts, vec!["a"]);
        assert_eq!(ends, vec!["d"]);
        assert_eq!(dag.id().as_str(), "group0_flow0_7");
    }

    #[test]
    fn child_is_ready_only_when_all_parents_complete() {
        let mut dag = diamond();
        dag.node_mut("a").unwrap().set_status(ExecutionStatus::Complete);
        assert_eq!(dag.ready_dependents("a"), vec!["b", "c"]);

        dag.node_mut("b").unwrap().set_status(ExecutionStatus::Complete);
        assert!(dag.ready_dependents("b").is_empty());

        dag.node_mut("c").unwrap().set_status(ExecutionStatus::Complete);
        assert_eq!(dag.ready_dependents("c"), vec!["d"]);
    }

    #[test]
    fn rejects_unknown_dependency_and_cycles() {
        let err = Dag::from_plans(vec![plan("a").after("zzz")]).unwrap_err();
        assert!(matches!(err, DagError::UnknownDependency { .. }));

        let err = Dag::from_plans(vec![plan("a").after("b"), plan("b").after("a")]).unwrap_err();
        assert!(matches!(err, DagError::Cycle(_)));

        assert_eq!(Dag::from_plans(vec![]).unwrap_err(), DagError::Empty);
    }

    #[test]
    fn rejects_duplicate_jobs_and_mixed_flows() {
        let err = Dag::from_plans(vec![plan("a"), plan("a")]).unwrap_err();
        assert_eq!(err, DagError::DuplicateJob("a".to_string()));

        let stray = JobExecutionPlan::new("group0", "flow0", 8, "group0", "b");
        let err = Dag::from_plans(vec![plan("a"), stray]).unwrap_err();
        assert!(matches!(err, DagError::MixedFlows { .. }));
    }

    #[test]
    fn malformed_failure_option_defaults_to_finish_running() {
        let dag = Dag::from_plans(vec![plan("a").with_failure_option("FINISH_WHENEVER")]).unwrap();
        assert_eq!(dag.failure_option(), FailureOption::FinishRunning);

        let dag =
            Dag::from_plans(vec![plan("a").with_failure_option("FINISH_ALL_POSSIBLE")]).unwrap();
        assert_eq!(dag.failure_option(), FailureOption::FinishAllPossible);
    }
}
