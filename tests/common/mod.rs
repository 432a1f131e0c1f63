#![allow(dead_code)]

// Re-export shared helpers from the dedicated test-utils crate.
pub use flowdag_test_utils::builders;
pub use flowdag_test_utils::{init_tracing, with_timeout, Harness};

use flowdag::dag::{DagId, JobKey};
use flowdag::engine::DagManager;

/// Clock value all manager tests start from, in epoch millis.
pub const START: u64 = 1_700_000_000_000;

/// Job keys currently tracked for `dag_id`, by job name.
pub fn tracked_jobs(manager: &DagManager, dag_id: &DagId) -> Vec<String> {
    manager
        .dag_to_jobs()
        .get(dag_id)
        .map(|keys| keys.iter().map(|k| k.job_name.clone()).collect())
        .unwrap_or_default()
}

/// How often `key` was polled.
pub fn poll_count(polls: &[JobKey], key: &JobKey) -> usize {
    polls.iter().filter(|k| *k == key).count()
}
