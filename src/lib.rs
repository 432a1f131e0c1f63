// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod logging;
pub mod status;
pub mod store;
pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::clock::{Clock, SystemClock};
use crate::config::{compile_all, load_and_validate, ConfigFile};
use crate::engine::{channels, DagManager, Runtime, RuntimeOptions};
use crate::exec::ProcessJobExecutor;
use crate::status::StatusBoard;
use crate::store::FsDagStateStore;

/// Subdirectory of the checkpoint directory holding failed DAGs.
pub const FAILED_DAGS_DIR: &str = "failed";

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the checkpoint store, status board and process executor
/// - the DAG manager (recovering persisted DAGs first)
/// - one DAG per configured flow
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let board = StatusBoard::new();
    let executor = ProcessJobExecutor::new(board.clone(), Arc::clone(&clock));

    let state_dir = resolve_state_dir(&config_path, &cfg.manager.state_store_dir);
    info!(dir = ?state_dir, "using checkpoint directory");
    let failed_store = FsDagStateStore::new(state_dir.join(FAILED_DAGS_DIR));
    let store = FsDagStateStore::new(state_dir);

    let (handle, inbox) = channels();
    let mut manager = DagManager::new(
        cfg.manager.options,
        inbox,
        Box::new(board),
        Box::new(executor),
        Box::new(store),
        Arc::clone(&clock),
    )
    .with_failed_store(Box::new(failed_store));

    let recovered = manager.recover();
    if recovered > 0 {
        info!(recovered, "resumed DAGs from a previous run");
    }

    let flow_execution_id = clock.now_millis();
    for dag in compile_all(&cfg, flow_execution_id)? {
        handle.add_dag(dag);
    }

    // Ctrl-C → graceful shutdown.
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        let _ = shutdown_tx.send(()).await;
    });

    let options = RuntimeOptions {
        tick_interval: cfg.manager.tick_interval,
        exit_when_idle: args.once,
    };

    let manager = Runtime::new(manager, shutdown_rx, options).run().await;
    drop(handle);

    let stats = manager.stats();
    if args.once && stats.dags_failed > 0 {
        anyhow::bail!("{} flow execution(s) failed", stats.dags_failed);
    }
    Ok(())
}

/// Relative checkpoint directories are resolved against the config file's
/// directory.
fn resolve_state_dir(config_path: &Path, state_dir: &Path) -> PathBuf {
    if state_dir.is_absolute() {
        return state_dir.to_path_buf();
    }
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(state_dir),
        _ => state_dir.to_path_buf(),
    }
}

/// Simple dry-run output: print manager settings, flows, jobs and commands.
fn print_dry_run(cfg: &ConfigFile) {
    let manager = &cfg.manager;
    println!("flowdag dry-run");
    println!("  manager.tick_interval = {:?}", manager.tick_interval);
    println!("  manager.job_start_sla = {:?}", manager.options.job_start_sla);
    println!("  manager.max_attempts = {}", manager.options.max_attempts);
    println!("  manager.state_store_dir = {:?}", manager.state_store_dir);
    println!(
        "  manager.failed_dag_retention = {:?}",
        manager.options.failed_dag_retention
    );
    if let Some(sla) = manager.options.default_flow_sla {
        println!("  manager.default_flow_sla = {:?}", sla);
    }
    println!();

    println!("flows ({}):", cfg.flow.len());
    for (name, flow) in cfg.flow.iter() {
        println!("  - {name} (group {})", flow.group);
        if let Some(ref option) = flow.failure_option {
            println!("      failure_option: {option}");
        }
        if let Some(ref sla) = flow.flow_sla {
            println!("      flow_sla: {sla}");
        }
        for (job, job_cfg) in flow.job.iter() {
            println!("      job {job}");
            println!("          cmd: {}", job_cfg.cmd);
            if !job_cfg.after.is_empty() {
                println!("          after: {:?}", job_cfg.after);
            }
            if let Some(ref sla) = job_cfg.job_start_sla {
                println!("          job_start_sla: {sla}");
            }
        }
    }

    debug!("dry-run complete (no execution)");
}
