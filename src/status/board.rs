// src/status/board.rs

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::dag::JobKey;
use crate::errors::{FlowdagError, Result};

use super::{JobStatus, JobStatusRetriever};

#[derive(Debug, Default)]
struct Entries {
    events: HashMap<JobKey, Vec<JobStatus>>,
    /// Epoch of the live attempt per job. Absent once the attempt is
    /// forgotten or its final event has been drained.
    live: HashMap<JobKey, u64>,
    next_epoch: u64,
}

/// Shared in-memory event log keyed by job.
///
/// Executors [`record`](StatusBoard::record) events from any thread; the DAG
/// manager drains them through [`JobStatusRetriever`]. Clones share the same
/// log.
///
/// Each submission [`open`](StatusBoard::open)s a new epoch for its job.
/// Events recorded against any other epoch are dropped, so a killed or
/// replaced attempt cannot leak events into the next one, and a forgotten job
/// leaves nothing behind.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    entries: Arc<Mutex<Entries>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    // A poisoned lock still holds a usable map; keep going.
    fn entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Start a new attempt of `key` and return its epoch.
    pub fn open(&self, key: &JobKey) -> u64 {
        let mut entries = self.entries();
        entries.next_epoch += 1;
        let epoch = entries.next_epoch;
        entries.live.insert(key.clone(), epoch);
        epoch
    }

    /// Record an event regardless of epoch.
    pub fn record(&self, key: &JobKey, status: JobStatus) {
        self.entries()
            .events
            .entry(key.clone())
            .or_default()
            .push(status);
    }

    /// Record an event of the attempt opened as `epoch`. Returns `false` when
    /// that attempt is no longer live and the event was dropped.
    pub fn record_attempt(&self, key: &JobKey, epoch: u64, status: JobStatus) -> bool {
        let mut entries = self.entries();
        if entries.live.get(key) != Some(&epoch) {
            return false;
        }
        entries.events.entry(key.clone()).or_default().push(status);
        true
    }

    /// Drop everything pending for `key` and retire its live attempt.
    pub fn forget(&self, key: &JobKey) {
        let mut entries = self.entries();
        entries.events.remove(key);
        entries.live.remove(key);
    }

    /// Number of events waiting to be drained for `key`.
    pub fn pending(&self, key: &JobKey) -> usize {
        self.entries().events.get(key).map(Vec::len).unwrap_or(0)
    }

    /// Number of jobs with undrained events or a live attempt.
    pub fn len(&self) -> usize {
        let entries = self.entries();
        entries
            .events
            .keys()
            .chain(entries.live.keys().filter(|k| !entries.events.contains_key(*k)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobStatusRetriever for StatusBoard {
    fn job_statuses(&mut self, key: &JobKey) -> Result<Vec<JobStatus>> {
        let mut entries = self.entries.lock().map_err(|_| FlowdagError::Retriever {
            job: key.to_string(),
            reason: "status board lock poisoned".to_string(),
        })?;
        let batch = entries.events.remove(key).unwrap_or_default();
        if batch.last().is_some_and(|s| s.status.is_final()) {
            entries.live.remove(key);
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::JobExecutionPlan;
    use crate::types::ExecutionStatus;

    fn key(job: &str) -> JobKey {
        JobExecutionPlan::new("g", "f", 1, "g", job).key()
    }

    #[test]
    fn retrieval_drains_recorded_events() {
        let (key, other) = (key("a"), key("b"));
        let board = StatusBoard::new();
        let mut retriever = board.clone();

        board.record(&key, JobStatus::new(&key, ExecutionStatus::Orchestrated));
        board.record(&key, JobStatus::new(&key, ExecutionStatus::Running));
        assert_eq!(board.pending(&key), 2);

        let batch = retriever.job_statuses(&key).unwrap();
        let statuses: Vec<_> = batch.iter().map(|s| s.status).collect();
        assert_eq!(
            statuses,
            vec![ExecutionStatus::Orchestrated, ExecutionStatus::Running]
        );
        assert!(retriever.job_statuses(&key).unwrap().is_empty());
        assert!(retriever.job_statuses(&other).unwrap().is_empty());
    }

    #[test]
    fn forgotten_attempt_cannot_record() {
        let key = key("a");
        let board = StatusBoard::new();

        let first = board.open(&key);
        assert!(board.record_attempt(&key, first, JobStatus::new(&key, ExecutionStatus::Running)));
        board.forget(&key);
        assert!(board.is_empty());

        assert!(!board.record_attempt(&key, first, JobStatus::new(&key, ExecutionStatus::Cancelled)));
        assert_eq!(board.pending(&key), 0);

        // A resubmission opens a fresh epoch; the old one stays dead.
        let second = board.open(&key);
        assert!(!board.record_attempt(&key, first, JobStatus::new(&key, ExecutionStatus::Cancelled)));
        assert!(board.record_attempt(&key, second, JobStatus::new(&key, ExecutionStatus::Running)));
        assert_eq!(board.pending(&key), 1);
    }

    #[test]
    fn draining_a_final_event_retires_the_attempt() {
        let key = key("a");
        let board = StatusBoard::new();
        let mut retriever = board.clone();

        let epoch = board.open(&key);
        board.record_attempt(&key, epoch, JobStatus::new(&key, ExecutionStatus::Running));
        retriever.job_statuses(&key).unwrap();
        assert_eq!(board.len(), 1);

        board.record_attempt(&key, epoch, JobStatus::new(&key, ExecutionStatus::Complete));
        retriever.job_statuses(&key).unwrap();
        assert!(board.is_empty());
    }
}
