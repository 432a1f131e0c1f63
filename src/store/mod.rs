// src/store/mod.rs

//! Durable and in-memory DAG checkpoints.
//!
//! - [`fs`] writes one JSON file per DAG and survives restarts.
//! - [`memory`] keeps snapshots in a map; the DAG manager uses it to retain
//!   failed DAGs until they are resumed or purged.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::dag::{Dag, DagId, DagNode, JobExecutionPlan};
use crate::errors::Result;
use crate::types::ExecutionStatus;

pub mod fs;
pub mod memory;

pub use fs::FsDagStateStore;
pub use memory::InMemoryDagStateStore;

/// Checkpoint store keyed by [`DagId`].
///
/// Only the control loop calls into a store, so implementations need no
/// internal locking.
pub trait DagStateStore: Send + Debug {
    /// Persist a snapshot of `dag`, replacing any earlier one.
    fn write_checkpoint(&mut self, dag: &Dag) -> Result<()>;

    /// Delete the snapshot for `dag_id`. Deleting a missing id is not an error.
    fn clean_up(&mut self, dag_id: &DagId) -> Result<()>;

    fn get_dags(&self) -> Result<Vec<Dag>>;

    fn get_dag(&self, dag_id: &DagId) -> Result<Option<Dag>>;

    fn get_dag_ids(&self) -> Result<Vec<DagId>>;
}

/// On-disk form of a DAG: its id plus every node's plan and progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DagCheckpoint {
    pub dag_id: DagId,
    pub nodes: Vec<NodeCheckpoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCheckpoint {
    pub plan: JobExecutionPlan,
    pub current_attempts: u32,
    #[serde(default)]
    pub orchestrated_at: Option<u64>,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub seen_running: bool,
}

impl DagCheckpoint {
    pub fn from_dag(dag: &Dag) -> Self {
        let nodes = dag
            .nodes()
            .iter()
            .map(|n| NodeCheckpoint {
                plan: n.plan().clone(),
                current_attempts: n.current_attempts(),
                orchestrated_at: n.orchestrated_at(),
                status: n.status(),
                seen_running: n.seen_running(),
            })
            .collect();

        Self {
            dag_id: dag.id().clone(),
            nodes,
        }
    }

    /// Rebuild the DAG, re-running the structural checks.
    pub fn into_dag(self) -> Result<Dag> {
        let nodes = self
            .nodes
            .into_iter()
            .map(|n| {
                DagNode::restore(
                    n.plan,
                    n.current_attempts,
                    n.orchestrated_at,
                    n.status,
                    n.seen_running,
                )
            })
            .collect();
        let dag = Dag::from_nodes(nodes)?;
        if dag.id() != &self.dag_id {
            return Err(crate::errors::FlowdagError::Store(format!(
                "checkpoint labelled {} holds nodes of {}",
                self.dag_id,
                dag.id()
            )));
        }
        Ok(dag)
    }
}
