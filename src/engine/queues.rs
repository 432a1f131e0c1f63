// src/engine/queues.rs

//! Inbound queues of the DAG manager.
//!
//! Producers hold a cloneable [`DagManagerHandle`]; the manager owns the
//! single [`ManagerInbox`] and drains it without waiting once per tick.

use tokio::sync::mpsc;
use tracing::warn;

use crate::dag::{Dag, DagId};

/// Create a connected handle/inbox pair.
pub fn channels() -> (DagManagerHandle, ManagerInbox) {
    let (dag_tx, dag_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = mpsc::unbounded_channel();
    let (resume_tx, resume_rx) = mpsc::unbounded_channel();

    (
        DagManagerHandle {
            dag_tx,
            cancel_tx,
            resume_tx,
        },
        ManagerInbox {
            dag_rx,
            cancel_rx,
            resume_rx,
        },
    )
}

/// Sending side of the manager queues. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DagManagerHandle {
    dag_tx: mpsc::UnboundedSender<Dag>,
    cancel_tx: mpsc::UnboundedSender<DagId>,
    resume_tx: mpsc::UnboundedSender<DagId>,
}

impl DagManagerHandle {
    /// Queue a new DAG for execution. Returns `false` if the manager is gone.
    pub fn add_dag(&self, dag: Dag) -> bool {
        let dag_id = dag.id().clone();
        let sent = self.dag_tx.send(dag).is_ok();
        if !sent {
            warn!(dag_id = %dag_id, "DAG manager stopped; dropping new DAG");
        }
        sent
    }

    pub fn cancel_dag(&self, dag_id: DagId) -> bool {
        self.cancel_tx.send(dag_id).is_ok()
    }

    pub fn resume_dag(&self, dag_id: DagId) -> bool {
        self.resume_tx.send(dag_id).is_ok()
    }
}

/// Receiving side of the manager queues.
#[derive(Debug)]
pub struct ManagerInbox {
    dag_rx: mpsc::UnboundedReceiver<Dag>,
    cancel_rx: mpsc::UnboundedReceiver<DagId>,
    resume_rx: mpsc::UnboundedReceiver<DagId>,
}

impl ManagerInbox {
    pub fn drain_dags(&mut self) -> Vec<Dag> {
        drain(&mut self.dag_rx)
    }

    pub fn drain_cancels(&mut self) -> Vec<DagId> {
        drain(&mut self.cancel_rx)
    }

    pub fn drain_resumes(&mut self) -> Vec<DagId> {
        drain(&mut self.resume_rx)
    }

    pub fn is_empty(&self) -> bool {
        self.dag_rx.is_empty() && self.cancel_rx.is_empty() && self.resume_rx.is_empty()
    }
}

fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}
