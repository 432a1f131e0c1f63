pub mod builders;
pub mod fake_executor;
pub mod scripted;

use std::sync::{Arc, Once};

use tracing_subscriber::{fmt, EnvFilter};

use flowdag::engine::{channels, DagManager, DagManagerHandle, ManagerOptions};
use flowdag::store::{DagStateStore, InMemoryDagStateStore};

use crate::fake_executor::{ExecutorLog, RecordingExecutor};
use crate::scripted::{ManualClock, ScriptedRetriever, StatusScript};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// A [`DagManager`] wired to scripted collaborators.
pub struct Harness {
    pub manager: DagManager,
    pub handle: DagManagerHandle,
    pub statuses: StatusScript,
    pub executor: ExecutorLog,
    pub clock: ManualClock,
}

impl Harness {
    /// Manager with an in-memory primary store and the clock at `start_millis`.
    pub fn new(options: ManagerOptions, start_millis: u64) -> Self {
        Self::with_store(options, start_millis, Box::new(InMemoryDagStateStore::new()))
    }

    pub fn with_store(
        options: ManagerOptions,
        start_millis: u64,
        store: Box<dyn DagStateStore>,
    ) -> Self {
        init_tracing();

        let (handle, inbox) = channels();
        let (retriever, statuses) = ScriptedRetriever::new();
        let (executor, executor_log) = RecordingExecutor::new();
        let clock = ManualClock::new(start_millis);

        let manager = DagManager::new(
            options,
            inbox,
            Box::new(retriever),
            Box::new(executor),
            store,
            Arc::new(clock.clone()),
        );

        Self {
            manager,
            handle,
            statuses,
            executor: executor_log,
            clock,
        }
    }

    /// Swap the manager's failed-DAG store.
    pub fn with_failed_store(mut self, failed_store: Box<dyn DagStateStore>) -> Self {
        self.manager = self.manager.with_failed_store(failed_store);
        self
    }

    /// Check that `job_to_dag` and `dag_to_jobs` describe the same set and
    /// that exactly the DAGs with tracked jobs are registered.
    pub fn assert_indexes_consistent(&self) {
        let m = &self.manager;
        let mut from_lists = 0;
        for (dag_id, keys) in m.dag_to_jobs() {
            assert!(!keys.is_empty(), "empty job list kept for {dag_id}");
            assert!(m.dags().contains_key(dag_id), "{dag_id} tracked but not registered");
            for key in keys {
                assert_eq!(m.job_to_dag().get(key), Some(dag_id));
                from_lists += 1;
            }
        }
        assert_eq!(from_lists, m.job_to_dag().len());
        for dag_id in m.dags().keys() {
            assert!(m.dag_to_jobs().contains_key(dag_id), "{dag_id} registered without jobs");
        }
    }
}
