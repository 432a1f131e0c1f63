// src/engine/manager.rs

//! The DAG manager control loop.
//!
//! [`DagManager::tick`] is synchronous and deterministic given its
//! collaborators: it drains the inbound queues, polls job status for every
//! tracked node, advances node and DAG state, and checkpoints. It never
//! blocks on a producer and never aborts on a collaborator failure; those are
//! logged and the in-memory transition stands.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::dag::{Dag, DagId, DagNode, JobExecutionPlan, JobKey};
use crate::errors::{FlowdagError, Result};
use crate::exec::JobExecutor;
use crate::status::{JobStatus, JobStatusRetriever};
use crate::store::{DagStateStore, InMemoryDagStateStore};
use crate::types::{parse_duration, ExecutionStatus, FailureOption};

use super::queues::ManagerInbox;
use super::{DagManagerStats, ManagerOptions, TickSummary};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// First run of a node, or a rerun after resume: attempts reset to 1.
    Fresh,
    /// Resubmission after PENDING_RETRY: attempts already bumped.
    Retry,
}

/// Bookkeeping for a DAG retained in the failed store.
#[derive(Debug, Clone)]
struct RetainedFailure {
    failed_at: u64,
    flow_key: Option<JobKey>,
}

/// Owns every active DAG and drives it to completion.
///
/// Producers talk to the manager only through a
/// [`DagManagerHandle`](super::DagManagerHandle); the indexes are exposed
/// read-only for inspection.
pub struct DagManager {
    options: ManagerOptions,
    inbox: ManagerInbox,
    retriever: Box<dyn JobStatusRetriever>,
    executor: Box<dyn JobExecutor>,
    store: Box<dyn DagStateStore>,
    failed_store: Box<dyn DagStateStore>,
    clock: Arc<dyn Clock>,

    dags: BTreeMap<DagId, Dag>,
    job_to_dag: HashMap<JobKey, DagId>,
    dag_to_jobs: BTreeMap<DagId, Vec<JobKey>>,
    failed_dag_ids: BTreeSet<DagId>,

    retained: HashMap<DagId, RetainedFailure>,
    start_slas: HashMap<JobKey, Duration>,
    flow_deadlines: HashMap<DagId, u64>,
    stats: DagManagerStats,
}

impl fmt::Debug for DagManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DagManager")
            .field("options", &self.options)
            .field("dags", &self.dags.keys().collect::<Vec<_>>())
            .field("dag_to_jobs", &self.dag_to_jobs)
            .field("failed_dag_ids", &self.failed_dag_ids)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl DagManager {
    /// Build a manager. Failed DAGs are retained in an in-memory store unless
    /// [`with_failed_store`](Self::with_failed_store) supplies another.
    pub fn new(
        options: ManagerOptions,
        inbox: ManagerInbox,
        retriever: Box<dyn JobStatusRetriever>,
        executor: Box<dyn JobExecutor>,
        store: Box<dyn DagStateStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            options,
            inbox,
            retriever,
            executor,
            store,
            failed_store: Box::new(InMemoryDagStateStore::new()),
            clock,
            dags: BTreeMap::new(),
            job_to_dag: HashMap::new(),
            dag_to_jobs: BTreeMap::new(),
            failed_dag_ids: BTreeSet::new(),
            retained: HashMap::new(),
            start_slas: HashMap::new(),
            flow_deadlines: HashMap::new(),
            stats: DagManagerStats::default(),
        }
    }

    pub fn with_failed_store(mut self, failed_store: Box<dyn DagStateStore>) -> Self {
        self.failed_store = failed_store;
        self
    }

    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    pub fn dags(&self) -> &BTreeMap<DagId, Dag> {
        &self.dags
    }

    pub fn job_to_dag(&self) -> &HashMap<JobKey, DagId> {
        &self.job_to_dag
    }

    pub fn dag_to_jobs(&self) -> &BTreeMap<DagId, Vec<JobKey>> {
        &self.dag_to_jobs
    }

    pub fn failed_dag_ids(&self) -> &BTreeSet<DagId> {
        &self.failed_dag_ids
    }

    pub fn stats(&self) -> DagManagerStats {
        self.stats
    }

    pub fn state_store(&self) -> &dyn DagStateStore {
        self.store.as_ref()
    }

    pub fn failed_state_store(&self) -> &dyn DagStateStore {
        self.failed_store.as_ref()
    }

    /// No DAG in flight and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.dags.is_empty() && self.inbox.is_empty()
    }

    /// Reload the state a previous process persisted.
    ///
    /// DAGs in the failed store become resumable again; their retention
    /// period restarts now. DAGs in the primary store go back into `dags`:
    /// in-flight nodes are tracked again without being resubmitted, but are
    /// restamped as just orchestrated so the start SLA reclaims any whose
    /// execution died with the old process. A DAG with nothing in flight has
    /// its startable nodes submitted; a fully complete snapshot is deleted.
    /// Returns the number of DAGs reloaded into `dags`.
    pub fn recover(&mut self) -> usize {
        let now = self.clock.now_millis();
        self.recover_failed(now);

        let persisted = match self.store.get_dags() {
            Ok(dags) => dags,
            Err(err) => {
                warn!(error = %err, "failed to list persisted DAGs; starting empty");
                return 0;
            }
        };

        let mut recovered = 0;

        for mut dag in persisted {
            let dag_id = dag.id().clone();
            if self.dags.contains_key(&dag_id) {
                continue;
            }
            if dag.is_complete() || self.failed_dag_ids.contains(&dag_id) {
                info!(dag_id = %dag_id, "persisted DAG already finished; deleting checkpoint");
                if let Err(err) = self.store.clean_up(&dag_id) {
                    warn!(dag_id = %dag_id, error = %err, "failed to delete checkpoint");
                }
                continue;
            }

            let in_flight: Vec<JobKey> = dag
                .nodes()
                .iter()
                .filter(|n| n.status().is_in_flight())
                .map(|n| n.key().clone())
                .collect();
            let mut tracked = Vec::with_capacity(in_flight.len());
            for key in in_flight {
                if let Some(node) = dag.node_by_key_mut(&key) {
                    node.mark_orchestrated(now);
                    tracked.push((key, self.start_sla_for(&dag_id, node.plan())));
                }
            }

            let deadline_base = dag.flow_execution_id();
            self.register_flow_sla(&dag, deadline_base);
            self.dags.insert(dag_id.clone(), dag);

            for (key, sla) in tracked {
                self.track(&dag_id, key, sla);
            }

            if !self.dag_to_jobs.contains_key(&dag_id) {
                let startable = self
                    .dags
                    .get(&dag_id)
                    .map(Dag::startable_nodes)
                    .unwrap_or_default();
                for job in startable {
                    if let Err(err) = self.submit_node(&dag_id, &job, now, Attempt::Fresh) {
                        error!(dag_id = %dag_id, error = %err, "failed to restart recovered job");
                    }
                }
            }

            info!(
                dag_id = %dag_id,
                tracked = self.dag_to_jobs.get(&dag_id).map(Vec::len).unwrap_or(0),
                "recovered DAG from checkpoint"
            );
            recovered += 1;
            self.finish_or_checkpoint(&dag_id, now);
        }

        recovered
    }

    fn recover_failed(&mut self, now: u64) {
        let failed = match self.failed_store.get_dags() {
            Ok(dags) => dags,
            Err(err) => {
                warn!(error = %err, "failed to list retained failed DAGs");
                return;
            }
        };
        for dag in &failed {
            self.index_failed(dag, now);
        }
        if !failed.is_empty() {
            info!(count = failed.len(), "reloaded failed DAGs for resume");
        }
    }

    /// Run one iteration of the control loop.
    pub fn tick(&mut self) -> TickSummary {
        let now = self.clock.now_millis();
        let finished_before = self.stats.dags_succeeded + self.stats.dags_failed;

        self.purge_expired_failures(now);
        let dags_added = self.ingest_new_dags(now);

        for dag_id in self.inbox.drain_cancels() {
            self.cancel_dag(&dag_id, now);
        }

        for dag_id in self.inbox.drain_resumes() {
            self.resume_dag(&dag_id, now);
        }

        let (jobs_polled, resume_requests) = self.advance_tracked_jobs(now);
        for dag_id in resume_requests {
            self.resume_dag(&dag_id, now);
        }

        let finished_after = self.stats.dags_succeeded + self.stats.dags_failed;
        TickSummary {
            dags_added,
            jobs_polled,
            dags_finished: (finished_after - finished_before) as usize,
        }
    }

    fn purge_expired_failures(&mut self, now: u64) {
        let retention = duration_millis(self.options.failed_dag_retention);
        let expired: Vec<DagId> = self
            .retained
            .iter()
            .filter(|(_, r)| now.saturating_sub(r.failed_at) > retention)
            .map(|(id, _)| id.clone())
            .collect();

        for dag_id in expired {
            self.retained.remove(&dag_id);
            self.failed_dag_ids.remove(&dag_id);
            if let Err(err) = self.failed_store.clean_up(&dag_id) {
                warn!(dag_id = %dag_id, error = %err, "failed to purge retained DAG");
            }
            info!(dag_id = %dag_id, "purged failed DAG past retention");
        }
    }

    fn ingest_new_dags(&mut self, now: u64) -> usize {
        let mut added = 0;

        for dag in self.inbox.drain_dags() {
            let dag_id = dag.id().clone();
            if self.dags.contains_key(&dag_id) || self.failed_dag_ids.contains(&dag_id) {
                warn!(dag_id = %dag_id, "DAG already known; ignoring duplicate");
                continue;
            }

            let start_nodes: Vec<String> = dag
                .start_nodes()
                .iter()
                .map(|n| n.job_name().to_string())
                .collect();

            self.register_flow_sla(&dag, dag.flow_execution_id());
            info!(dag_id = %dag_id, jobs = dag.len(), failure_option = %dag.failure_option(), "initializing DAG");
            self.dags.insert(dag_id.clone(), dag);

            for job in start_nodes {
                if let Err(err) = self.submit_node(&dag_id, &job, now, Attempt::Fresh) {
                    error!(dag_id = %dag_id, error = %err, "failed to submit start node");
                }
            }

            self.finish_or_checkpoint(&dag_id, now);
            added += 1;
        }

        added
    }

    fn cancel_dag(&mut self, dag_id: &DagId, now: u64) {
        if !self.dags.contains_key(dag_id) {
            warn!(dag_id = %dag_id, "cancel requested for unknown DAG; ignoring");
            return;
        }
        info!(dag_id = %dag_id, "cancelling DAG on request");
        self.fail_dag(dag_id, now, "cancelled on request");
    }

    fn resume_dag(&mut self, dag_id: &DagId, now: u64) {
        if !self.failed_dag_ids.remove(dag_id) {
            debug!(dag_id = %dag_id, "resume requested for DAG that is not failed; ignoring");
            return;
        }
        let retained = self.retained.remove(dag_id);

        let dag = match self.failed_store.get_dag(dag_id) {
            Ok(Some(dag)) => dag,
            Ok(None) => {
                warn!(dag_id = %dag_id, "failed DAG missing from failed store; cannot resume");
                return;
            }
            Err(err) => {
                warn!(dag_id = %dag_id, error = %err, "failed to load failed DAG; will retry resume later");
                self.failed_dag_ids.insert(dag_id.clone());
                if let Some(r) = retained {
                    self.retained.insert(dag_id.clone(), r);
                }
                return;
            }
        };

        let mut rerun: Vec<String> = dag
            .nodes()
            .iter()
            .filter(|n| n.status().is_failure())
            .filter(|n| dag.dependencies_complete(n.job_name()))
            .map(|n| n.job_name().to_string())
            .collect();
        rerun.extend(dag.startable_nodes());

        if rerun.is_empty() {
            warn!(dag_id = %dag_id, "failed DAG has nothing to rerun; keeping it failed");
            self.failed_dag_ids.insert(dag_id.clone());
            if let Some(r) = retained {
                self.retained.insert(dag_id.clone(), r);
            }
            return;
        }

        if let Err(err) = self.failed_store.clean_up(dag_id) {
            warn!(dag_id = %dag_id, error = %err, "failed to delete failed-store copy of resumed DAG");
        }

        info!(dag_id = %dag_id, jobs = ?rerun, "resuming DAG");
        self.register_flow_sla(&dag, now);
        self.dags.insert(dag_id.clone(), dag);

        for job in rerun {
            if let Err(err) = self.submit_node(dag_id, &job, now, Attempt::Fresh) {
                error!(dag_id = %dag_id, error = %err, "failed to resubmit job on resume");
            }
        }

        self.finish_or_checkpoint(dag_id, now);
    }

    /// Poll every tracked job and act on its latest status. Returns the
    /// number of jobs polled and the DAG ids whose resume was signalled.
    fn advance_tracked_jobs(&mut self, now: u64) -> (usize, Vec<DagId>) {
        let snapshot: Vec<(DagId, Vec<JobKey>)> = self
            .dag_to_jobs
            .iter()
            .map(|(id, keys)| (id.clone(), keys.clone()))
            .collect();

        let mut polled = 0;
        let mut resume_requests = Vec::new();

        for (dag_id, keys) in snapshot {
            if let Err(err) =
                self.advance_dag(&dag_id, &keys, now, &mut polled, &mut resume_requests)
            {
                error!(dag_id = %dag_id, error = %err, "aborting DAG processing for this tick");
            }
        }

        self.poll_resume_signals(&mut resume_requests);
        (polled, resume_requests)
    }

    fn advance_dag(
        &mut self,
        dag_id: &DagId,
        keys: &[JobKey],
        now: u64,
        polled: &mut usize,
        resume_requests: &mut Vec<DagId>,
    ) -> Result<()> {
        if !self.dags.contains_key(dag_id) {
            return Err(FlowdagError::invariant(dag_id, "jobs tracked for unregistered DAG"));
        }

        if let Some(&deadline) = self.flow_deadlines.get(dag_id) {
            if now > deadline {
                warn!(dag_id = %dag_id, deadline, now, "flow SLA exceeded; killing DAG");
                self.stats.sla_kills += 1;
                self.fail_dag(dag_id, now, "flow SLA exceeded");
                return Ok(());
            }
        }

        for key in keys {
            // An earlier job of this DAG may have failed or finished it.
            if self.job_to_dag.get(key) != Some(dag_id) {
                continue;
            }

            *polled += 1;
            let latest = match self.retriever.job_statuses(key) {
                Ok(events) => events.into_iter().last(),
                Err(err) => {
                    warn!(dag_id = %dag_id, job = %key, error = %err, "status retrieval failed; treating as no event");
                    None
                }
            };

            self.apply_status(dag_id, key, latest, now, resume_requests)?;
        }

        Ok(())
    }

    fn apply_status(
        &mut self,
        dag_id: &DagId,
        key: &JobKey,
        latest: Option<JobStatus>,
        now: u64,
        resume_requests: &mut Vec<DagId>,
    ) -> Result<()> {
        let status = latest.as_ref().map(JobStatus::effective_status);
        let event_orchestrated = latest.as_ref().and_then(|s| s.orchestrated_time);

        match status {
            None | Some(ExecutionStatus::Pending) | Some(ExecutionStatus::Orchestrated) => {
                self.check_start_sla(dag_id, key, event_orchestrated, now)
            }
            Some(ExecutionStatus::Running) => {
                let node = self.tracked_node_mut(dag_id, key)?;
                if !node.seen_running() {
                    node.mark_running();
                    debug!(dag_id = %dag_id, job = %key, "job running");
                    self.checkpoint(dag_id);
                }
                Ok(())
            }
            Some(ExecutionStatus::Complete) => self.on_job_complete(dag_id, key, now),
            Some(ExecutionStatus::Failed) => self.on_job_failed(dag_id, key, now),
            Some(ExecutionStatus::Cancelled) => {
                self.tracked_node_mut(dag_id, key)?
                    .set_status(ExecutionStatus::Cancelled);
                self.untrack(key);
                info!(dag_id = %dag_id, job = %key, "job cancelled");
                self.fail_dag(dag_id, now, "job cancelled");
                Ok(())
            }
            Some(ExecutionStatus::PendingRetry) => self.on_job_retry(dag_id, key, now),
            Some(ExecutionStatus::PendingResume) => {
                if let Some(event) = latest {
                    resume_requests.push(event.dag_id());
                }
                Ok(())
            }
        }
    }

    fn check_start_sla(
        &mut self,
        dag_id: &DagId,
        key: &JobKey,
        event_orchestrated: Option<u64>,
        now: u64,
    ) -> Result<()> {
        let sla = self
            .start_slas
            .get(key)
            .copied()
            .unwrap_or(self.options.job_start_sla);
        let node = self.tracked_node_mut(dag_id, key)?;
        if node.seen_running() {
            return Ok(());
        }
        let Some(orchestrated) = event_orchestrated.or(node.orchestrated_at()) else {
            return Ok(());
        };

        let waited = now.saturating_sub(orchestrated);
        if waited <= duration_millis(sla) {
            return Ok(());
        }

        warn!(
            dag_id = %dag_id,
            job = %key,
            waited_ms = waited,
            sla_ms = duration_millis(sla),
            "job start SLA exceeded; killing DAG"
        );
        self.stats.sla_kills += 1;
        self.fail_dag(dag_id, now, "job start SLA exceeded");
        Ok(())
    }

    fn on_job_complete(&mut self, dag_id: &DagId, key: &JobKey, now: u64) -> Result<()> {
        let ready = {
            let dag = self
                .dags
                .get_mut(dag_id)
                .ok_or_else(|| FlowdagError::invariant(dag_id, "DAG vanished while completing job"))?;
            let node = dag.node_by_key_mut(key).ok_or_else(|| missing_node(dag_id, key))?;
            node.set_status(ExecutionStatus::Complete);
            let job = node.job_name().to_string();
            dag.ready_dependents(&job)
        };

        self.untrack(key);
        info!(dag_id = %dag_id, job = %key, "job complete");

        for job in ready {
            self.submit_node(dag_id, &job, now, Attempt::Fresh)?;
        }

        self.finish_or_checkpoint(dag_id, now);
        Ok(())
    }

    fn on_job_failed(&mut self, dag_id: &DagId, key: &JobKey, now: u64) -> Result<()> {
        self.tracked_node_mut(dag_id, key)?
            .set_status(ExecutionStatus::Failed);
        self.untrack(key);

        let option = self
            .dags
            .get(dag_id)
            .map(Dag::failure_option)
            .unwrap_or_default();
        warn!(dag_id = %dag_id, job = %key, failure_option = %option, "job failed");

        match option {
            FailureOption::FinishRunning => self.fail_dag(dag_id, now, "job failed"),
            FailureOption::FinishAllPossible => self.finish_or_checkpoint(dag_id, now),
        }
        Ok(())
    }

    fn on_job_retry(&mut self, dag_id: &DagId, key: &JobKey, now: u64) -> Result<()> {
        let max_attempts = self.options.max_attempts;
        let node = self.tracked_node_mut(dag_id, key)?;
        let attempts = node.increment_attempts();

        if attempts > max_attempts {
            warn!(dag_id = %dag_id, job = %key, attempts, max_attempts, "retries exhausted");
            return self.on_job_failed(dag_id, key, now);
        }

        let job = node.job_name().to_string();
        info!(dag_id = %dag_id, job = %key, attempt = attempts, "retrying job");
        self.stats.retries += 1;
        self.submit_node(dag_id, &job, now, Attempt::Retry)?;
        self.checkpoint(dag_id);
        Ok(())
    }

    /// Check the flow-level status entry of retained failed DAGs for a
    /// resume signal.
    fn poll_resume_signals(&mut self, resume_requests: &mut Vec<DagId>) {
        let flow_keys: Vec<(DagId, JobKey)> = self
            .retained
            .iter()
            .filter_map(|(id, r)| r.flow_key.clone().map(|k| (id.clone(), k)))
            .collect();

        for (dag_id, flow_key) in flow_keys {
            match self.retriever.job_statuses(&flow_key) {
                Ok(events) => {
                    let signalled = events
                        .last()
                        .is_some_and(|e| e.status == ExecutionStatus::PendingResume);
                    if signalled {
                        debug!(dag_id = %dag_id, "resume signalled by flow status");
                        resume_requests.push(dag_id);
                    }
                }
                Err(err) => {
                    warn!(dag_id = %dag_id, error = %err, "flow status retrieval failed");
                }
            }
        }
    }

    /// Stamp, submit and track `job`. A failed submission is logged and the
    /// node stays tracked so its start SLA eventually reclaims it.
    fn submit_node(&mut self, dag_id: &DagId, job: &str, now: u64, attempt: Attempt) -> Result<()> {
        let default_sla = self.options.job_start_sla;
        let dag = self
            .dags
            .get_mut(dag_id)
            .ok_or_else(|| FlowdagError::invariant(dag_id, "submitting into unregistered DAG"))?;
        let node = dag
            .node_mut(job)
            .ok_or_else(|| FlowdagError::invariant(dag_id, format!("unknown job '{job}'")))?;

        if attempt == Attempt::Fresh {
            node.reset_attempts();
        }
        node.mark_orchestrated(now);
        let key = node.key().clone();
        let start_sla = resolve_start_sla(dag_id, node.plan(), default_sla);

        match self.executor.submit(node) {
            Ok(()) => debug!(
                dag_id = %dag_id,
                job = %key,
                attempt = node.current_attempts(),
                "submitted job"
            ),
            Err(err) => warn!(
                dag_id = %dag_id,
                job = %key,
                error = %err,
                "job submission failed; leaving it to the start SLA"
            ),
        }

        self.stats.jobs_submitted += 1;
        self.track(dag_id, key, start_sla);
        Ok(())
    }

    /// Cancel every tracked job of the DAG, then retain it as failed.
    fn fail_dag(&mut self, dag_id: &DagId, now: u64, reason: &str) {
        let keys = self.dag_to_jobs.get(dag_id).cloned().unwrap_or_default();
        for key in keys {
            self.untrack(&key);
            if let Some(node) = self.dags.get_mut(dag_id).and_then(|d| d.node_by_key_mut(&key)) {
                if let Err(err) = self.executor.cancel(node) {
                    warn!(dag_id = %dag_id, job = %key, error = %err, "job cancellation failed");
                }
                node.set_status(ExecutionStatus::Cancelled);
                debug!(dag_id = %dag_id, job = %key, "cancelled job");
            }
        }

        if let Some(dag) = self.dags.remove(dag_id) {
            self.flow_deadlines.remove(dag_id);
            warn!(dag_id = %dag_id, reason, "DAG failed");
            self.retain_failed(dag, now);
        }
    }

    /// Checkpoint a DAG that still has tracked jobs, or finish it.
    fn finish_or_checkpoint(&mut self, dag_id: &DagId, now: u64) {
        if self.dag_to_jobs.contains_key(dag_id) {
            self.checkpoint(dag_id);
            return;
        }

        let Some(dag) = self.dags.remove(dag_id) else {
            return;
        };
        self.flow_deadlines.remove(dag_id);

        if dag.is_complete() {
            if let Err(err) = self.store.clean_up(dag_id) {
                warn!(dag_id = %dag_id, error = %err, "failed to delete checkpoint of completed DAG");
            }
            self.stats.dags_succeeded += 1;
            info!(
                dag_id = %dag_id,
                succeeded = self.stats.dags_succeeded,
                failed = self.stats.dags_failed,
                "DAG completed"
            );
        } else {
            warn!(dag_id = %dag_id, "DAG finished with failures");
            self.retain_failed(dag, now);
        }
    }

    fn retain_failed(&mut self, dag: Dag, now: u64) {
        let dag_id = dag.id().clone();
        if let Err(err) = self.store.clean_up(&dag_id) {
            warn!(dag_id = %dag_id, error = %err, "failed to delete checkpoint of failed DAG");
        }
        if let Err(err) = self.failed_store.write_checkpoint(&dag) {
            warn!(dag_id = %dag_id, error = %err, "failed to retain failed DAG");
        }

        self.index_failed(&dag, now);
        self.stats.dags_failed += 1;
        info!(
            dag_id = %dag_id,
            succeeded = self.stats.dags_succeeded,
            failed = self.stats.dags_failed,
            "failed DAG retained for resume"
        );
    }

    fn index_failed(&mut self, dag: &Dag, failed_at: u64) {
        let flow_key = dag.nodes().first().map(|n| n.key().flow_level());
        self.failed_dag_ids.insert(dag.id().clone());
        self.retained
            .insert(dag.id().clone(), RetainedFailure { failed_at, flow_key });
    }

    fn checkpoint(&mut self, dag_id: &DagId) {
        if let Some(dag) = self.dags.get(dag_id) {
            if let Err(err) = self.store.write_checkpoint(dag) {
                warn!(dag_id = %dag_id, error = %err, "checkpoint write failed; continuing in memory");
            }
        }
    }

    fn register_flow_sla(&mut self, dag: &Dag, start_millis: u64) {
        match resolve_flow_sla(dag, self.options.default_flow_sla) {
            Some(sla) => {
                self.flow_deadlines
                    .insert(dag.id().clone(), start_millis.saturating_add(duration_millis(sla)));
            }
            None => {
                self.flow_deadlines.remove(dag.id());
            }
        }
    }

    fn start_sla_for(&self, dag_id: &DagId, plan: &JobExecutionPlan) -> Duration {
        resolve_start_sla(dag_id, plan, self.options.job_start_sla)
    }

    fn track(&mut self, dag_id: &DagId, key: JobKey, start_sla: Duration) {
        self.start_slas.insert(key.clone(), start_sla);
        self.job_to_dag.insert(key.clone(), dag_id.clone());
        let jobs = self.dag_to_jobs.entry(dag_id.clone()).or_default();
        if !jobs.contains(&key) {
            jobs.push(key);
        }
    }

    fn untrack(&mut self, key: &JobKey) {
        self.start_slas.remove(key);
        if let Some(dag_id) = self.job_to_dag.remove(key) {
            if let Some(jobs) = self.dag_to_jobs.get_mut(&dag_id) {
                jobs.retain(|k| k != key);
                if jobs.is_empty() {
                    self.dag_to_jobs.remove(&dag_id);
                }
            }
        }
    }

    fn tracked_node_mut(&mut self, dag_id: &DagId, key: &JobKey) -> Result<&mut DagNode> {
        self.dags
            .get_mut(dag_id)
            .and_then(|d| d.node_by_key_mut(key))
            .ok_or_else(|| missing_node(dag_id, key))
    }
}

fn missing_node(dag_id: &DagId, key: &JobKey) -> FlowdagError {
    FlowdagError::invariant(dag_id, format!("tracked job {key} missing from its DAG"))
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Flow SLA of `dag`: its own setting if present, the default otherwise.
/// A malformed setting disables flow-SLA enforcement for this DAG.
fn resolve_flow_sla(dag: &Dag, default: Option<Duration>) -> Option<Duration> {
    match dag.flow_sla() {
        None => default,
        Some(raw) => match parse_duration(raw) {
            Ok(sla) => Some(sla),
            Err(err) => {
                warn!(
                    dag_id = %dag.id(),
                    value = raw,
                    error = %err,
                    "malformed flow SLA; flow SLA disabled for this DAG"
                );
                None
            }
        },
    }
}

fn resolve_start_sla(dag_id: &DagId, plan: &JobExecutionPlan, default: Duration) -> Duration {
    match plan.job_start_sla.as_deref() {
        None => default,
        Some(raw) => parse_duration(raw).unwrap_or_else(|err| {
            warn!(
                dag_id = %dag_id,
                job = %plan.job_name,
                value = raw,
                error = %err,
                "malformed job start SLA; using default"
            );
            default
        }),
    }
}
