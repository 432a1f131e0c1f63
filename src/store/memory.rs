// src/store/memory.rs

use std::collections::BTreeMap;

use tracing::debug;

use crate::dag::{Dag, DagId};
use crate::errors::Result;

use super::DagStateStore;

/// Keeps DAG snapshots in memory only.
#[derive(Debug, Default)]
pub struct InMemoryDagStateStore {
    dags: BTreeMap<DagId, Dag>,
}

impl InMemoryDagStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.dags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dags.is_empty()
    }
}

impl DagStateStore for InMemoryDagStateStore {
    fn write_checkpoint(&mut self, dag: &Dag) -> Result<()> {
        self.dags.insert(dag.id().clone(), dag.clone());
        debug!(dag_id = %dag.id(), "stored checkpoint (memory)");
        Ok(())
    }

    fn clean_up(&mut self, dag_id: &DagId) -> Result<()> {
        if self.dags.remove(dag_id).is_some() {
            debug!(dag_id = %dag_id, "removed checkpoint (memory)");
        }
        Ok(())
    }

    fn get_dags(&self) -> Result<Vec<Dag>> {
        Ok(self.dags.values().cloned().collect())
    }

    fn get_dag(&self, dag_id: &DagId) -> Result<Option<Dag>> {
        Ok(self.dags.get(dag_id).cloned())
    }

    fn get_dag_ids(&self) -> Result<Vec<DagId>> {
        Ok(self.dags.keys().cloned().collect())
    }
}
