// src/exec/backend.rs

//! Pluggable job executor abstraction.
//!
//! The DAG manager only needs to know whether handing a job over (or asking
//! for its cancellation) succeeded; job outcomes come back separately through
//! a [`JobStatusRetriever`](crate::status::JobStatusRetriever).

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::clock::Clock;
use crate::dag::DagNode;
use crate::errors::{FlowdagError, Result};
use crate::status::{JobStatus, StatusBoard};
use crate::types::ExecutionStatus;

use super::executor_loop::{spawn_executor, ExecRequest, JobRun};

/// Starts and stops concrete job executions.
pub trait JobExecutor: Send {
    fn submit(&mut self, node: &DagNode) -> Result<()>;
    fn cancel(&mut self, node: &DagNode) -> Result<()>;
}

/// Runs each job's command as a local process.
///
/// `submit` records ORCHESTRATED on the status board and forwards the job to
/// the background executor loop, which records the remaining lifecycle
/// events. A non-zero exit is reported as a retryable failure; the manager's
/// attempt budget decides whether it runs again. Must be created inside a
/// Tokio runtime.
pub struct ProcessJobExecutor {
    tx: mpsc::UnboundedSender<ExecRequest>,
    board: StatusBoard,
    clock: Arc<dyn Clock>,
}

impl ProcessJobExecutor {
    pub fn new(board: StatusBoard, clock: Arc<dyn Clock>) -> Self {
        let tx = spawn_executor(board.clone(), Arc::clone(&clock));
        Self { tx, board, clock }
    }

    fn send(&self, request: ExecRequest) -> Result<()> {
        self.tx
            .send(request)
            .map_err(|_| FlowdagError::Executor("executor loop is not running".to_string()))
    }
}

impl JobExecutor for ProcessJobExecutor {
    fn submit(&mut self, node: &DagNode) -> Result<()> {
        let key = node.key().clone();
        let orchestrated = node
            .orchestrated_at()
            .unwrap_or_else(|| self.clock.now_millis());

        // Recorded before the loop can report RUNNING for this attempt.
        let epoch = self.board.open(&key);
        self.board.record_attempt(
            &key,
            epoch,
            JobStatus::new(&key, ExecutionStatus::Orchestrated).with_orchestrated_time(orchestrated),
        );

        self.send(ExecRequest::Run(JobRun {
            key: key.clone(),
            command: node.plan().command.clone(),
            attempt: node.current_attempts(),
            epoch,
        }))?;

        debug!(job = %key, attempt = node.current_attempts(), "job handed to executor loop");
        Ok(())
    }

    /// Kill the job's process. The manager stops tracking the job at the
    /// same time, so whatever it would still report is dropped.
    fn cancel(&mut self, node: &DagNode) -> Result<()> {
        let key = node.key();
        self.board.forget(key);
        self.send(ExecRequest::Cancel(key.clone()))
    }
}
