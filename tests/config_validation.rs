// tests/config_validation.rs

mod common;

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use common::builders::{ConfigFileBuilder, FlowConfigBuilder};
use flowdag::config::{compile_all, load_and_validate, parse_and_validate, ConfigFile};
use flowdag::errors::FlowdagError;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn loads_config_file_with_defaults() -> TestResult {
    let tmp = tempdir()?;
    let path = tmp.path().join("Flowdag.toml");
    fs::write(
        &path,
        r#"
        [flow.ingest.job.extract]
        cmd = "echo extract"

        [flow.ingest.job.load]
        cmd = "echo load"
        after = ["extract"]
        "#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(cfg.manager.tick_interval, Duration::from_secs(1));
    assert_eq!(cfg.manager.options.job_start_sla, Duration::from_secs(15 * 60));
    assert_eq!(cfg.manager.options.max_attempts, 5);
    assert_eq!(
        cfg.manager.options.failed_dag_retention,
        Duration::from_secs(7 * 24 * 60 * 60)
    );
    assert_eq!(cfg.manager.options.default_flow_sla, None);
    assert_eq!(cfg.manager.state_store_dir, PathBuf::from(".flowdag/checkpoints"));

    let flow = cfg.flow.get("ingest").ok_or("flow missing")?;
    assert_eq!(flow.group, "default");
    assert_eq!(flow.job.len(), 2);
    Ok(())
}

#[test]
fn manager_section_overrides_defaults() -> TestResult {
    let cfg = parse_and_validate(
        r#"
        [manager]
        tick_interval = "250ms"
        job_start_sla = "5m"
        max_attempts = 2
        state_store_dir = "/var/lib/flowdag"
        failed_dag_retention = "1d"
        default_flow_sla = "3h"

        [flow.report.job.render]
        cmd = "true"
        "#,
    )?;

    assert_eq!(cfg.manager.tick_interval, Duration::from_millis(250));
    assert_eq!(cfg.manager.options.job_start_sla, Duration::from_secs(300));
    assert_eq!(cfg.manager.options.max_attempts, 2);
    assert_eq!(cfg.manager.options.failed_dag_retention, Duration::from_secs(86_400));
    assert_eq!(cfg.manager.options.default_flow_sla, Some(Duration::from_secs(3 * 3600)));
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let result = load_and_validate("/definitely/not/here/Flowdag.toml");
    assert!(matches!(result, Err(FlowdagError::IoError(_))));
}

#[test]
fn malformed_toml_is_rejected() {
    let result = parse_and_validate("[flow.ingest\ncmd = ");
    assert!(matches!(result, Err(FlowdagError::TomlError(_))));
}

#[test]
fn config_without_flows_is_rejected() {
    let result = ConfigFile::try_from(ConfigFileBuilder::new().raw());
    assert!(matches!(result, Err(FlowdagError::ConfigError(_))));
}

#[test]
fn flow_without_jobs_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_flow("empty", FlowConfigBuilder::new("etl").build())
        .raw();
    let result = ConfigFile::try_from(raw);
    assert!(matches!(result, Err(FlowdagError::ConfigError(msg)) if msg.contains("empty")));
}

#[test]
fn unknown_dependency_is_rejected() {
    let flow = FlowConfigBuilder::new("etl")
        .job("load", "echo load")
        .after("load", "extract")
        .build();
    let raw = ConfigFileBuilder::new().with_flow("ingest", flow).raw();

    let result = ConfigFile::try_from(raw);
    assert!(matches!(result, Err(FlowdagError::ConfigError(msg)) if msg.contains("extract")));
}

#[test]
fn self_dependency_is_rejected() {
    let flow = FlowConfigBuilder::new("etl")
        .job("load", "echo load")
        .after("load", "load")
        .build();
    let raw = ConfigFileBuilder::new().with_flow("ingest", flow).raw();

    assert!(matches!(
        ConfigFile::try_from(raw),
        Err(FlowdagError::ConfigError(_))
    ));
}

#[test]
fn dependency_cycle_is_rejected() {
    let flow = FlowConfigBuilder::new("etl")
        .job("a", "true")
        .job("b", "true")
        .job("c", "true")
        .after("a", "c")
        .after("b", "a")
        .after("c", "b")
        .build();
    let raw = ConfigFileBuilder::new().with_flow("loop", flow).raw();

    assert!(matches!(ConfigFile::try_from(raw), Err(FlowdagError::DagCycle(_))));
}

#[test]
fn zero_max_attempts_is_rejected() {
    let raw = ConfigFileBuilder::new()
        .with_flow("ingest", FlowConfigBuilder::new("etl").job("a", "true").build())
        .max_attempts(0)
        .raw();

    assert!(matches!(ConfigFile::try_from(raw), Err(FlowdagError::ConfigError(_))));
}

#[test]
fn bad_manager_durations_are_rejected() {
    for interval in ["0s", "1 second", "fast"] {
        let raw = ConfigFileBuilder::new()
            .with_flow("ingest", FlowConfigBuilder::new("etl").job("a", "true").build())
            .tick_interval(interval)
            .raw();
        assert!(
            matches!(ConfigFile::try_from(raw), Err(FlowdagError::ConfigError(_))),
            "tick_interval {interval:?} should be rejected"
        );
    }
}

#[test]
fn malformed_flow_sla_is_accepted_at_load() -> TestResult {
    let flow = FlowConfigBuilder::new("etl")
        .job("a", "true")
        .flow_sla("whenever")
        .failure_option("SOMETIMES")
        .build();
    let cfg = ConfigFileBuilder::new().with_flow("ingest", flow).build();

    let dags = compile_all(&cfg, 42)?;
    assert_eq!(dags.len(), 1);
    assert_eq!(dags[0].flow_sla(), Some("whenever"));
    Ok(())
}
