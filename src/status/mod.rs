// src/status/mod.rs

//! Job status events and the retriever seam the DAG manager polls.

use serde::{Deserialize, Serialize};

use crate::dag::{DagId, JobKey};
use crate::errors::Result;
use crate::types::ExecutionStatus;

pub mod board;

pub use board::StatusBoard;

/// One status observation for a job execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub flow_group: String,
    pub flow_name: String,
    pub flow_execution_id: u64,
    pub job_group: String,
    pub job_name: String,
    pub status: ExecutionStatus,
    /// Epoch millis when the job process started, if it has.
    #[serde(default)]
    pub start_time: Option<u64>,
    /// Epoch millis when the job was handed to the executor.
    #[serde(default)]
    pub orchestrated_time: Option<u64>,
    /// The executor asks for another attempt, whatever `status` says.
    #[serde(default)]
    pub should_retry: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl JobStatus {
    pub fn new(key: &JobKey, status: ExecutionStatus) -> Self {
        Self {
            flow_group: key.flow_group.clone(),
            flow_name: key.flow_name.clone(),
            flow_execution_id: key.flow_execution_id,
            job_group: key.job_group.clone(),
            job_name: key.job_name.clone(),
            status,
            start_time: None,
            orchestrated_time: None,
            should_retry: false,
            message: None,
        }
    }

    pub fn with_start_time(mut self, millis: u64) -> Self {
        self.start_time = Some(millis);
        self
    }

    pub fn with_orchestrated_time(mut self, millis: u64) -> Self {
        self.orchestrated_time = Some(millis);
        self
    }

    pub fn with_retry(mut self) -> Self {
        self.should_retry = true;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn dag_id(&self) -> DagId {
        DagId::new(&self.flow_group, &self.flow_name, self.flow_execution_id)
    }

    /// Status the DAG manager should act on.
    ///
    /// A retry request overrides any status that is not already final.
    pub fn effective_status(&self) -> ExecutionStatus {
        match self.status {
            ExecutionStatus::Complete | ExecutionStatus::Cancelled | ExecutionStatus::PendingResume => {
                self.status
            }
            _ if self.should_retry => ExecutionStatus::PendingRetry,
            other => other,
        }
    }
}

/// Source of job status events.
///
/// Each call returns the events observed for `key` since the previous call,
/// oldest first. An empty batch means nothing new happened.
pub trait JobStatusRetriever: Send {
    fn job_statuses(&mut self, key: &JobKey) -> Result<Vec<JobStatus>>;
}
