use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use flowdag::dag::{DagNode, JobKey};
use flowdag::errors::{FlowdagError, Result};
use flowdag::exec::JobExecutor;

/// Shared view of what a [`RecordingExecutor`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct ExecutorLog {
    submitted: Arc<Mutex<Vec<(JobKey, u32)>>>,
    cancelled: Arc<Mutex<Vec<JobKey>>>,
    fail_submissions: Arc<AtomicBool>,
}

impl ExecutorLog {
    /// Submitted job names, in order, with the attempt number at submission.
    pub fn submitted(&self) -> Vec<(String, u32)> {
        self.submitted
            .lock()
            .unwrap()
            .iter()
            .map(|(k, a)| (k.job_name.clone(), *a))
            .collect()
    }

    pub fn submitted_jobs(&self) -> Vec<String> {
        self.submitted().into_iter().map(|(name, _)| name).collect()
    }

    pub fn cancelled_jobs(&self) -> Vec<String> {
        self.cancelled
            .lock()
            .unwrap()
            .iter()
            .map(|k| k.job_name.clone())
            .collect()
    }

    pub fn cancelled_keys(&self) -> Vec<JobKey> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Make every following `submit` return an error.
    pub fn fail_submissions(&self, fail: bool) {
        self.fail_submissions.store(fail, Ordering::SeqCst);
    }
}

/// A fake executor that:
/// - records which jobs were submitted or cancelled
/// - never runs anything; statuses are scripted separately.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    log: ExecutorLog,
}

impl RecordingExecutor {
    pub fn new() -> (Self, ExecutorLog) {
        let log = ExecutorLog::default();
        (Self { log: log.clone() }, log)
    }
}

impl JobExecutor for RecordingExecutor {
    fn submit(&mut self, node: &DagNode) -> Result<()> {
        if self.log.fail_submissions.load(Ordering::SeqCst) {
            return Err(FlowdagError::Executor(format!(
                "injected submission failure for {}",
                node.key()
            )));
        }
        self.log
            .submitted
            .lock()
            .unwrap()
            .push((node.key().clone(), node.current_attempts()));
        Ok(())
    }

    fn cancel(&mut self, node: &DagNode) -> Result<()> {
        self.log.cancelled.lock().unwrap().push(node.key().clone());
        Ok(())
    }
}
