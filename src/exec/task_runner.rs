// src/exec/task_runner.rs

//! Individual job process runner.

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::dag::JobKey;
use crate::exec::executor_loop::{CancelReason, JobRun};
use crate::status::{JobStatus, StatusBoard};
use crate::types::ExecutionStatus;

/// Run one job attempt and record its lifecycle on the status board.
///
/// - RUNNING once the process is spawned, then COMPLETE on a zero exit.
/// - FAILED with the retry flag on a non-zero exit.
/// - FAILED without it when there is nothing to run or spawning fails.
/// - CANCELLED when the DAG manager requested cancellation.
/// - Nothing at all when the attempt was replaced by a newer one.
///
/// Every event is recorded under the attempt's epoch, so the board drops it
/// once a newer attempt exists or the job was forgotten.
pub async fn run_job(
    run: JobRun,
    board: StatusBoard,
    clock: Arc<dyn Clock>,
    cancel_rx: oneshot::Receiver<CancelReason>,
) {
    let reporter = Reporter {
        key: run.key.clone(),
        epoch: run.epoch,
        board,
    };
    if let Err(err) = run_job_inner(run, &reporter, clock.as_ref(), cancel_rx).await {
        error!(job = %reporter.key, error = %err, "job execution error");
        reporter.report(
            JobStatus::new(&reporter.key, ExecutionStatus::Failed).with_message(format!("{err:#}")),
        );
    }
}

struct Reporter {
    key: JobKey,
    epoch: u64,
    board: StatusBoard,
}

impl Reporter {
    fn report(&self, status: JobStatus) {
        if !self.board.record_attempt(&self.key, self.epoch, status) {
            debug!(job = %self.key, epoch = self.epoch, "dropping event of a stale attempt");
        }
    }
}

async fn run_job_inner(
    run: JobRun,
    reporter: &Reporter,
    clock: &dyn Clock,
    mut cancel_rx: oneshot::Receiver<CancelReason>,
) -> Result<()> {
    let key = run.key;
    let Some(command) = run.command else {
        anyhow::bail!("job '{}' has no command to run", key.job_name);
    };

    info!(job = %key, attempt = run.attempt, cmd = %command, "starting job process");

    // Build a shell command appropriate for the platform.
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(&command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(&command);
        c
    };

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for job '{}'", key.job_name))?;

    reporter.report(JobStatus::new(&key, ExecutionStatus::Running).with_start_time(clock.now_millis()));

    // Always consume output so pipe buffers don't fill; log at debug.
    if let Some(stdout) = child.stdout.take() {
        forward_lines(key.clone(), "stdout", stdout);
    }
    if let Some(stderr) = child.stderr.take() {
        forward_lines(key.clone(), "stderr", stderr);
    }

    tokio::select! {
        status_res = child.wait() => {
            let status = status_res
                .with_context(|| format!("waiting for process of job '{}'", key.job_name))?;
            let code = status.code().unwrap_or(-1);

            info!(job = %key, exit_code = code, success = status.success(), "job process exited");

            let event = if status.success() {
                JobStatus::new(&key, ExecutionStatus::Complete)
            } else {
                JobStatus::new(&key, ExecutionStatus::Failed)
                    .with_retry()
                    .with_message(format!("exit code {code}"))
            };
            reporter.report(event);
        }

        cancel = &mut cancel_rx => {
            match cancel {
                Ok(reason) => {
                    info!(job = %key, ?reason, "killing job process");
                    if let Err(e) = child.kill().await {
                        warn!(job = %key, error = %e, "failed to kill child process on cancellation");
                    }
                    if reason == CancelReason::Requested {
                        reporter.report(JobStatus::new(&key, ExecutionStatus::Cancelled));
                    }
                }
                Err(e) => {
                    debug!(job = %key, error = %e, "cancel channel closed without explicit cancellation");
                    // Child will be killed on drop due to kill_on_drop(true).
                }
            }
        }
    }

    Ok(())
}

fn forward_lines<R>(key: JobKey, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(job = %key, stream, "{}", line);
        }
    });
}
