// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use super::manager::DagManager;

/// Options of the async shell.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeOptions {
    /// Fixed delay between two ticks.
    pub tick_interval: Duration,
    /// If true, exit once no DAG is in flight and nothing is queued (used
    /// for `--once`).
    pub exit_when_idle: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            exit_when_idle: false,
        }
    }
}

/// Drives a [`DagManager`] on a fixed-delay interval.
///
/// This is a thin IO shell: all semantics live in the manager's synchronous
/// `tick`. The shell only decides *when* to tick and when to stop.
pub struct Runtime {
    manager: DagManager,
    shutdown_rx: mpsc::Receiver<()>,
    options: RuntimeOptions,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("manager", &self.manager)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runtime {
    pub fn new(manager: DagManager, shutdown_rx: mpsc::Receiver<()>, options: RuntimeOptions) -> Self {
        Self {
            manager,
            shutdown_rx,
            options,
        }
    }

    /// Main loop. Returns the manager so callers can inspect its final state.
    pub async fn run(mut self) -> DagManager {
        info!(tick_interval = ?self.options.tick_interval, "flowdag runtime started");

        let mut interval = time::interval(self.options.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut shutdown_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let summary = self.manager.tick();
                    debug!(?summary, "tick finished");

                    if self.options.exit_when_idle && self.manager.is_idle() {
                        info!("no DAG in flight; exiting");
                        break;
                    }
                }
                signal = self.shutdown_rx.recv(), if shutdown_open => {
                    match signal {
                        Some(()) => {
                            info!("shutdown requested; stopping runtime");
                            break;
                        }
                        None => {
                            debug!("shutdown channel closed; ticking until idle or killed");
                            shutdown_open = false;
                        }
                    }
                }
            }
        }

        let stats = self.manager.stats();
        info!(
            succeeded = stats.dags_succeeded,
            failed = stats.dags_failed,
            jobs_submitted = stats.jobs_submitted,
            retries = stats.retries,
            sla_kills = stats.sla_kills,
            "runtime exiting"
        );
        self.manager
    }
}
