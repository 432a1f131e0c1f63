// src/exec/mod.rs

//! Job submission and cancellation.
//!
//! - [`backend`] provides the [`JobExecutor`] trait the DAG manager talks to
//!   and the production [`ProcessJobExecutor`].
//! - [`executor_loop`] owns the background loop that keeps at most one
//!   process per job.
//! - [`task_runner`] runs a single job command and reports its status.
//!
//! Tests replace the whole layer with a recording executor and drive job
//! status through a scripted retriever.

pub mod backend;
pub mod executor_loop;
pub mod task_runner;

pub use backend::{JobExecutor, ProcessJobExecutor};
pub use executor_loop::{spawn_executor, ExecRequest, JobRun};
