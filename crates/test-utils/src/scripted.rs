use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use flowdag::clock::Clock;
use flowdag::dag::JobKey;
use flowdag::errors::{FlowdagError, Result};
use flowdag::status::{JobStatus, JobStatusRetriever};
use flowdag::types::ExecutionStatus;

/// Per-job queue of status batches handed out one batch per poll.
#[derive(Debug, Clone, Default)]
pub struct StatusScript {
    batches: Arc<Mutex<HashMap<JobKey, VecDeque<Vec<JobStatus>>>>>,
    failing: Arc<Mutex<HashSet<JobKey>>>,
    polls: Arc<Mutex<Vec<JobKey>>>,
}

impl StatusScript {
    /// Queue a single-event batch with `status` for `key`.
    pub fn push(&self, key: &JobKey, status: ExecutionStatus) {
        self.push_event(key, JobStatus::new(key, status));
    }

    pub fn push_event(&self, key: &JobKey, event: JobStatus) {
        self.push_batch(key, vec![event]);
    }

    pub fn push_batch(&self, key: &JobKey, batch: Vec<JobStatus>) {
        self.batches
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push_back(batch);
    }

    /// Make the next poll of `key` return an error.
    pub fn fail_next(&self, key: &JobKey) {
        self.failing.lock().unwrap().insert(key.clone());
    }

    /// Every key polled so far, in order.
    pub fn polls(&self) -> Vec<JobKey> {
        self.polls.lock().unwrap().clone()
    }
}

/// Retriever replaying a [`StatusScript`]. An exhausted script returns
/// empty batches.
#[derive(Debug, Default)]
pub struct ScriptedRetriever {
    script: StatusScript,
}

impl ScriptedRetriever {
    pub fn new() -> (Self, StatusScript) {
        let script = StatusScript::default();
        (
            Self {
                script: script.clone(),
            },
            script,
        )
    }
}

impl JobStatusRetriever for ScriptedRetriever {
    fn job_statuses(&mut self, key: &JobKey) -> Result<Vec<JobStatus>> {
        self.script.polls.lock().unwrap().push(key.clone());

        if self.script.failing.lock().unwrap().remove(key) {
            return Err(FlowdagError::Retriever {
                job: key.to_string(),
                reason: "injected retrieval failure".to_string(),
            });
        }

        Ok(self
            .script
            .batches
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_default())
    }
}

/// Clock tests can set and advance by hand. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
