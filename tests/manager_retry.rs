// tests/manager_retry.rs

mod common;

use std::error::Error;

use common::builders::{build_dag, dag_id, job_key};
use common::{tracked_jobs, Harness, START};
use flowdag::dag::DagId;
use flowdag::engine::{DagManager, ManagerOptions};
use flowdag::status::JobStatus;
use flowdag::types::ExecutionStatus;

type TestResult = Result<(), Box<dyn Error>>;

fn attempts(manager: &DagManager, id: &DagId, job: &str) -> Option<u32> {
    manager
        .dags()
        .get(id)
        .and_then(|d| d.node(job))
        .map(|n| n.current_attempts())
}

#[test]
fn job_succeeds_after_retry() -> TestResult {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let id = dag_id("0", START);
    let (k0, k1, k2) = (job_key("0", START, 0), job_key("0", START, 1), job_key("0", START, 2));

    h.statuses.push(&k0, ExecutionStatus::Running);
    h.statuses
        .push_event(&k0, JobStatus::new(&k0, ExecutionStatus::Running).with_retry());
    h.statuses.push(&k0, ExecutionStatus::Complete);
    h.statuses.push(&k1, ExecutionStatus::Running);
    h.statuses.push(&k1, ExecutionStatus::Complete);
    h.statuses.push(&k2, ExecutionStatus::Running);
    h.statuses.push(&k2, ExecutionStatus::Complete);

    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 3));

    h.manager.tick();
    assert_eq!(attempts(&h.manager, &id, "job0"), Some(1));

    // Retry requested while running: resubmitted as attempt 2.
    h.manager.tick();
    assert_eq!(tracked_jobs(&h.manager, &id), vec!["job0"]);
    assert_eq!(attempts(&h.manager, &id, "job0"), Some(2));
    assert_eq!(
        h.executor.submitted(),
        vec![("job0".to_string(), 1), ("job0".to_string(), 2)]
    );
    let persisted = h.manager.state_store().get_dag(&id)?.ok_or("no checkpoint")?;
    assert_eq!(persisted.node("job0").map(|n| n.current_attempts()), Some(2));

    h.manager.tick();
    assert_eq!(tracked_jobs(&h.manager, &id), vec!["job1", "job2"]);

    h.manager.tick();
    h.manager.tick();
    assert!(h.manager.dags().is_empty());
    assert!(h.manager.state_store().get_dags()?.is_empty());

    let stats = h.manager.stats();
    assert_eq!(stats.retries, 1);
    assert_eq!(stats.dags_succeeded, 1);
    assert_eq!(stats.jobs_submitted, 4);
    Ok(())
}

#[test]
fn job_fails_after_max_attempts() -> TestResult {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let id = dag_id("0", START);
    let k0 = job_key("0", START, 0);

    h.statuses.push(&k0, ExecutionStatus::Running);
    for _ in 0..3 {
        h.statuses
            .push_event(&k0, JobStatus::new(&k0, ExecutionStatus::Running).with_retry());
    }
    h.statuses
        .push_event(&k0, JobStatus::new(&k0, ExecutionStatus::PendingRetry).with_retry());
    h.statuses.push(&k0, ExecutionStatus::Running);
    h.statuses.push(&k0, ExecutionStatus::Failed);

    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 5));

    // Ticks 1..=4: attempts climb from 1 to 4.
    for expected in 1..=4 {
        h.manager.tick();
        assert_eq!(tracked_jobs(&h.manager, &id), vec!["job0"]);
        assert_eq!(attempts(&h.manager, &id, "job0"), Some(expected));
    }

    // Tick 5: the last allowed attempt goes out.
    h.manager.tick();
    assert_eq!(attempts(&h.manager, &id, "job0"), Some(5));
    assert_eq!(h.manager.dags().len(), 1);

    // Tick 6: running.
    h.manager.tick();
    assert_eq!(h.manager.dags().len(), 1);

    // Tick 7: final failure cleans up.
    h.manager.tick();
    assert!(h.manager.dags().is_empty());
    assert!(h.manager.job_to_dag().is_empty());
    assert!(h.manager.dag_to_jobs().is_empty());
    assert!(h.manager.state_store().get_dags()?.is_empty());
    assert!(h.manager.failed_dag_ids().contains(&id));

    let submitted: Vec<u32> = h.executor.submitted().into_iter().map(|(_, a)| a).collect();
    assert_eq!(submitted, vec![1, 2, 3, 4, 5]);
    assert_eq!(h.manager.stats().retries, 4);
    Ok(())
}

#[test]
fn exhausted_retries_fail_the_job() {
    let options = ManagerOptions {
        max_attempts: 2,
        ..ManagerOptions::default()
    };
    let mut h = Harness::new(options, START);
    let id = dag_id("0", START);
    let k0 = job_key("0", START, 0);

    for _ in 0..2 {
        h.statuses
            .push_event(&k0, JobStatus::new(&k0, ExecutionStatus::Failed).with_retry());
    }
    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 2));

    h.manager.tick();
    assert_eq!(attempts(&h.manager, &id, "job0"), Some(2));

    h.manager.tick();
    assert!(h.manager.dags().is_empty());
    assert!(h.manager.failed_dag_ids().contains(&id));

    h.manager.tick();
    let stats = h.manager.stats();
    assert_eq!(stats.dags_failed, 1);
    assert_eq!(stats.retries, 1);
    assert_eq!(h.executor.submitted_jobs(), vec!["job0", "job0"]);
}

#[test]
fn retry_flag_does_not_override_completion() {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let id = dag_id("0", START);
    let k0 = job_key("0", START, 0);

    h.statuses
        .push_event(&k0, JobStatus::new(&k0, ExecutionStatus::Complete).with_retry());
    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 2));
    h.manager.tick();

    assert_eq!(tracked_jobs(&h.manager, &id), vec!["job1"]);
    assert_eq!(h.manager.stats().retries, 0);
}
