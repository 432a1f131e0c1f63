// src/exec/executor_loop.rs

//! Main executor loop that manages running job processes.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::dag::JobKey;
use crate::exec::task_runner::run_job;
use crate::status::StatusBoard;

/// One attempt of a job, as handed to the executor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub key: JobKey,
    pub command: Option<String>,
    pub attempt: u32,
    /// Status-board epoch this attempt records its events under.
    pub epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecRequest {
    Run(JobRun),
    Cancel(JobKey),
}

/// Why a running process is being stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// A newer attempt of the same job was submitted.
    Replaced,
    /// The DAG manager asked for the job to be cancelled.
    Requested,
}

/// Internal handle for a currently-running job process.
///
/// - `cancel` stops the process (resubmission or explicit cancel).
/// - `handle` is the Tokio task that is actually running the command.
struct ActiveJob {
    cancel: Option<oneshot::Sender<CancelReason>>,
    handle: tokio::task::JoinHandle<()>,
}

/// Spawn the background executor loop.
///
/// Each job attempt runs in its own Tokio task, and **per job key there will
/// never be more than one process running at the same time**: a new attempt
/// for a key whose previous process is still alive kills that process first.
pub fn spawn_executor(
    board: StatusBoard,
    clock: Arc<dyn Clock>,
) -> mpsc::UnboundedSender<ExecRequest> {
    let (tx, mut rx) = mpsc::unbounded_channel::<ExecRequest>();

    tokio::spawn(async move {
        info!("executor loop started");

        let mut active: HashMap<JobKey, ActiveJob> = HashMap::new();

        while let Some(request) = rx.recv().await {
            match request {
                ExecRequest::Run(run) => start_job(run, &mut active, &board, &clock),
                ExecRequest::Cancel(key) => cancel_job(&key, &mut active, CancelReason::Requested),
            }
        }

        info!("executor loop finished (channel closed)");
    });

    tx
}

fn start_job(
    run: JobRun,
    active: &mut HashMap<JobKey, ActiveJob>,
    board: &StatusBoard,
    clock: &Arc<dyn Clock>,
) {
    cancel_job(&run.key, active, CancelReason::Replaced);

    let (cancel_tx, cancel_rx) = oneshot::channel::<CancelReason>();
    let key = run.key.clone();
    let board = board.clone();
    let clock = Arc::clone(clock);

    let handle = tokio::spawn(async move {
        let job = run.key.clone();
        run_job(run, board, clock, cancel_rx).await;
        debug!(job = %job, "job runner future finished");
    });

    active.insert(
        key,
        ActiveJob {
            cancel: Some(cancel_tx),
            handle,
        },
    );
}

/// Stop the live process for `key`, if any.
fn cancel_job(key: &JobKey, active: &mut HashMap<JobKey, ActiveJob>, reason: CancelReason) {
    let Some(mut existing) = active.remove(key) else {
        if reason == CancelReason::Requested {
            debug!(job = %key, "cancel requested for job with no live process");
        }
        return;
    };

    if existing.handle.is_finished() {
        return;
    }

    info!(job = %key, ?reason, "cancelling running job process");
    if let Some(cancel) = existing.cancel.take() {
        if cancel.send(reason).is_err() {
            debug!(job = %key, "process already finished while cancelling");
        }
    }
}
