// tests/manager_sla.rs

mod common;

use std::error::Error;
use std::time::Duration;

use common::builders::{build_dag, dag_id, dag_plan, job_key};
use common::{tracked_jobs, Harness, START};
use flowdag::dag::Dag;
use flowdag::engine::ManagerOptions;
use flowdag::status::JobStatus;
use flowdag::types::ExecutionStatus;

type TestResult = Result<(), Box<dyn Error>>;

const MINUTE: u64 = 60 * 1000;

/// Two-node chain `job0 -> job1` for flow `id`, with a flow SLA on every plan.
fn dag_with_flow_sla(id: &str, flow_sla: &str) -> Result<Dag, Box<dyn Error>> {
    let plans = vec![
        dag_plan(id, START, 0).with_flow_sla(flow_sla),
        dag_plan(id, START, 1).with_flow_sla(flow_sla).after("job0"),
    ];
    Ok(Dag::from_plans(plans)?)
}

#[test]
fn job_start_sla_kills_only_the_late_dag() -> TestResult {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let (late, on_time) = (dag_id("0", START), dag_id("1", START));
    let (late_key, on_time_key) = (job_key("0", START, 0), job_key("1", START, 0));

    h.statuses.push_event(
        &late_key,
        JobStatus::new(&late_key, ExecutionStatus::Orchestrated)
            .with_orchestrated_time(START - 16 * MINUTE),
    );
    h.statuses.push_event(
        &on_time_key,
        JobStatus::new(&on_time_key, ExecutionStatus::Orchestrated)
            .with_orchestrated_time(START - 10 * MINUTE),
    );

    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 3));
    h.handle.add_dag(build_dag("1", START, "FINISH_RUNNING", 3));
    h.manager.tick();

    assert!(!h.manager.dags().contains_key(&late));
    assert!(h.manager.failed_dag_ids().contains(&late));
    assert_eq!(h.executor.cancelled_keys(), vec![late_key]);

    assert!(h.manager.dags().contains_key(&on_time));
    assert_eq!(tracked_jobs(&h.manager, &on_time), vec!["job0"]);
    assert_eq!(h.manager.stats().sla_kills, 1);
    h.assert_indexes_consistent();
    Ok(())
}

#[test]
fn job_start_sla_is_measured_from_submission() {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let id = dag_id("0", START);

    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 2));
    h.manager.tick();

    h.clock.advance(Duration::from_secs(15 * 60));
    h.manager.tick();
    assert!(h.manager.dags().contains_key(&id));

    h.clock.advance(Duration::from_millis(1));
    h.manager.tick();
    assert!(!h.manager.dags().contains_key(&id));
    assert_eq!(h.executor.cancelled_jobs(), vec!["job0"]);
    assert_eq!(h.manager.stats().sla_kills, 1);
}

#[test]
fn running_job_is_exempt_from_start_sla() {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let id = dag_id("0", START);

    h.statuses.push(&job_key("0", START, 0), ExecutionStatus::Running);
    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 2));
    h.manager.tick();

    h.clock.advance(Duration::from_secs(60 * 60));
    h.manager.tick();
    assert_eq!(tracked_jobs(&h.manager, &id), vec!["job0"]);
    assert_eq!(h.manager.stats().sla_kills, 0);
}

#[test]
fn per_job_start_sla_overrides_default() -> TestResult {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let plans = vec![
        dag_plan("0", START, 0).with_job_start_sla("1m"),
        dag_plan("1", START, 0).with_job_start_sla("soon"),
    ];
    let strict = Dag::from_plans(vec![plans[0].clone()])?;
    let malformed = Dag::from_plans(vec![plans[1].clone()])?;
    let (strict_id, malformed_id) = (strict.id().clone(), malformed.id().clone());

    h.handle.add_dag(strict);
    h.handle.add_dag(malformed);
    h.manager.tick();

    h.clock.advance(Duration::from_secs(61));
    h.manager.tick();

    assert!(!h.manager.dags().contains_key(&strict_id));
    // A malformed override falls back to the 15 minute default.
    assert!(h.manager.dags().contains_key(&malformed_id));
    Ok(())
}

#[test]
fn flow_sla_kills_overdue_dag() -> TestResult {
    let mut h = Harness::new(ManagerOptions::default(), START);
    let id = dag_id("0", START);

    h.statuses.push(&job_key("0", START, 0), ExecutionStatus::Running);
    h.handle.add_dag(dag_with_flow_sla("0", "30m")?);
    h.manager.tick();

    h.clock.advance(Duration::from_secs(30 * 60));
    h.manager.tick();
    assert!(h.manager.dags().contains_key(&id));

    h.clock.advance(Duration::from_secs(60));
    h.manager.tick();
    assert!(!h.manager.dags().contains_key(&id));
    assert!(h.manager.failed_dag_ids().contains(&id));
    assert_eq!(h.executor.cancelled_jobs(), vec!["job0"]);
    assert_eq!(h.manager.stats().sla_kills, 1);
    Ok(())
}

#[test]
fn default_flow_sla_applies_without_plan_setting() {
    let options = ManagerOptions {
        default_flow_sla: Some(Duration::from_secs(10 * 60)),
        ..ManagerOptions::default()
    };
    let mut h = Harness::new(options, START);
    let id = dag_id("0", START);

    h.statuses.push(&job_key("0", START, 0), ExecutionStatus::Running);
    h.handle.add_dag(build_dag("0", START, "FINISH_RUNNING", 2));
    h.manager.tick();

    h.clock.advance(Duration::from_secs(11 * 60));
    h.manager.tick();
    assert!(!h.manager.dags().contains_key(&id));
    assert_eq!(h.manager.stats().sla_kills, 1);
}

#[test]
fn malformed_flow_sla_disables_enforcement() -> TestResult {
    let options = ManagerOptions {
        default_flow_sla: Some(Duration::from_secs(60)),
        ..ManagerOptions::default()
    };
    let mut h = Harness::new(options, START);
    let id = dag_id("0", START);
    let (k0, k1) = (job_key("0", START, 0), job_key("0", START, 1));

    h.statuses.push(&k0, ExecutionStatus::Running);
    h.handle.add_dag(dag_with_flow_sla("0", "1 hour")?);
    h.manager.tick();

    h.clock.advance(Duration::from_secs(2 * 60 * 60));
    h.manager.tick();
    assert_eq!(tracked_jobs(&h.manager, &id), vec!["job0"]);

    h.statuses.push(&k0, ExecutionStatus::Complete);
    h.statuses.push(&k1, ExecutionStatus::Complete);
    h.manager.tick();
    h.manager.tick();
    assert!(h.manager.dags().is_empty());
    assert_eq!(h.manager.stats().dags_succeeded, 1);
    assert_eq!(h.manager.stats().sla_kills, 0);
    Ok(())
}

#[test]
fn out_of_range_sla_values_degrade_like_malformed_ones() -> TestResult {
    let options = ManagerOptions {
        default_flow_sla: Some(Duration::from_secs(60)),
        ..ManagerOptions::default()
    };
    let mut h = Harness::new(options, START);
    let id = dag_id("0", START);
    let huge = "999999999999999999d";
    let plans = vec![
        dag_plan("0", START, 0)
            .with_flow_sla(huge)
            .with_job_start_sla(huge),
    ];
    h.handle.add_dag(Dag::from_plans(plans)?);
    h.manager.tick();

    // The start SLA falls back to 15 minutes and the flow SLA is off.
    h.clock.advance(Duration::from_secs(14 * 60));
    h.manager.tick();
    assert_eq!(tracked_jobs(&h.manager, &id), vec!["job0"]);

    h.clock.advance(Duration::from_secs(2 * 60));
    h.manager.tick();
    assert!(h.manager.failed_dag_ids().contains(&id));
    assert_eq!(h.manager.stats().sla_kills, 1);
    Ok(())
}
