// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use serde_json::Value;

use crate::job_engine::error::{JobEngineError, JobError, Result};
use crate::job_engine::job::{Job, JobId, JobState, JobStatus};
use crate::job_engine::state::{PoolState, Shared};
use crate::job_engine::status::{TaskList, WorkerStatus};
use crate::job_engine::worker::Worker;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Number of worker threads; `None` uses the host's available parallelism.
    pub workers: Option<usize>,
    /// Prefix for the names of the dispatcher and worker threads.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: None,
            thread_name: "jobgraph".to_string(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
            ..Self::default()
        }
    }

    pub fn worker_count(&self) -> Result<usize> {
        match self.workers {
            Some(0) => Err(JobEngineError::InvalidWorkerCount),
            Some(workers) => Ok(workers),
            None => Ok(thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1)),
        }
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    dispatcher: Option<JoinHandle<()>>,
    workers: Vec<Worker>,
}

/// A fixed pool of worker threads plus a dispatcher thread that hands ready jobs
/// to idle workers, earliest submitted first.
#[derive(Debug)]
pub struct Scheduler {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let count = config.worker_count()?;
        let shared = Arc::new(Shared::new(count));
        let mut lifecycle = Lifecycle::default();

        if let Err(err) = Self::start_threads(&shared, &config, count, &mut lifecycle) {
            Self::stop_threads(&shared, &mut lifecycle);
            return Err(err);
        }
        info!("Started scheduler with {} workers", count);

        Ok(Self {
            shared,
            lifecycle: Mutex::new(lifecycle),
        })
    }

    pub fn with_workers(workers: usize) -> Result<Self> {
        Self::new(SchedulerConfig::with_workers(workers))
    }

    pub fn with_default_workers() -> Result<Self> {
        Self::new(SchedulerConfig::default())
    }

    fn start_threads(
        shared: &Arc<Shared>,
        config: &SchedulerConfig,
        count: usize,
        lifecycle: &mut Lifecycle,
    ) -> Result<()> {
        for index in 0..count {
            lifecycle
                .workers
                .push(Worker::spawn(shared.clone(), index, &config.thread_name)?);
        }
        let dispatcher_shared = shared.clone();
        lifecycle.dispatcher = Some(
            thread::Builder::new()
                .name(format!("{}-dispatcher", config.thread_name))
                .spawn(move || dispatcher_loop(&dispatcher_shared))?,
        );
        Ok(())
    }

    fn stop_threads(shared: &Shared, lifecycle: &mut Lifecycle) {
        {
            let mut state = shared.lock();
            state.accepting = false;
            state.enabled = false;
        }
        shared.pool_signal.notify_all();
        if let Some(handle) = lifecycle.dispatcher.take() {
            if handle.join().is_err() {
                error!("dispatcher terminated abnormally");
            }
        }
        for mut worker in lifecycle.workers.drain(..) {
            worker.shutdown(shared);
        }
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_signals.len()
    }

    /// Places a job in the scheduler without queueing it, so that further edges can
    /// be added before submission.
    pub fn create(&self, job: Job) -> Result<JobId> {
        let mut state = self.shared.lock();
        if !state.accepting {
            return Err(JobEngineError::ShutDown);
        }
        state.arena.insert(job)
    }

    /// `create` followed by `submit`.
    pub fn spawn(&self, job: Job) -> Result<JobId> {
        let id = self.create(job)?;
        self.submit(&[id])?;
        Ok(id)
    }

    /// Makes `job` depend on each of `dependencies`. Returns `job` for chaining.
    pub fn add_dependencies(&self, job: JobId, dependencies: &[JobId]) -> Result<JobId> {
        let mut state = self.shared.lock();
        state.arena.add_dependencies(job, dependencies)?;
        Ok(job)
    }

    /// Makes each of `dependents` depend on `job`. Returns `job` for chaining.
    pub fn add_dependents(&self, job: JobId, dependents: &[JobId]) -> Result<JobId> {
        let mut state = self.shared.lock();
        state.arena.add_dependents(job, dependents)?;
        Ok(job)
    }

    /// Appends jobs to the pending queue in the given order.
    pub fn submit(&self, jobs: &[JobId]) -> Result<()> {
        let mut state = self.shared.lock();
        if !state.accepting {
            warn!("Ignoring submission of {} jobs after shutdown", jobs.len());
            return Err(JobEngineError::ShutDown);
        }
        for (position, id) in jobs.iter().enumerate() {
            if state.arena.get(*id)?.state() != JobState::Created || jobs[..position].contains(id)
            {
                return Err(JobEngineError::AlreadySubmitted(*id));
            }
        }
        for id in jobs {
            state.arena.enqueue(*id);
        }
        debug!(
            "Submitted {} jobs, {} pending",
            jobs.len(),
            state.arena.pending_len()
        );
        self.shared.pool_signal.notify_all();
        Ok(())
    }

    /// Blocks until the pending queue is empty, or until nothing in it can ever be
    /// dispatched. Jobs still executing on a worker are not waited for.
    pub fn wait(&self) {
        let mut state = self.shared.lock();
        while !state.is_drained() {
            state = self.shared.wait_pool(state);
        }
    }

    /// Blocks until no worker is occupied and no pending job is ready.
    pub fn wait_idle(&self) {
        let mut state = self.shared.lock();
        while !state.is_quiescent() {
            state = self.shared.wait_pool(state);
        }
    }

    /// True while a worker is occupied or a pending job is ready to be dispatched.
    pub fn busy(&self) -> bool {
        !self.shared.lock().is_quiescent()
    }

    /// Drains the pending queue, stops the dispatcher and joins every worker after
    /// its in-flight job. Calling it again is a no-op.
    pub fn shutdown(&self) {
        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
        if lifecycle.dispatcher.is_none() && lifecycle.workers.is_empty() {
            return;
        }
        self.shared.lock().accepting = false;
        self.wait();
        Self::stop_threads(&self.shared, &mut lifecycle);

        let state = self.shared.lock();
        if state.arena.pending_len() == 0 {
            info!(
                "Scheduler shut down after dispatching {} jobs",
                state.dispatched.len()
            );
        } else {
            warn!(
                "Scheduler shut down with {} jobs that never became ready",
                state.arena.pending_len()
            );
        }
    }

    pub fn state(&self, job: JobId) -> Result<JobState> {
        Ok(self.shared.lock().arena.get(job)?.state())
    }

    /// True iff every dependency of `job` has completed.
    pub fn is_ready(&self, job: JobId) -> Result<bool> {
        let state = self.shared.lock();
        state.arena.get(job)?;
        Ok(state.arena.is_ready(job))
    }

    pub fn is_complete(&self, job: JobId) -> Result<bool> {
        Ok(self.shared.lock().arena.get(job)?.is_complete())
    }

    pub fn result(&self, job: JobId) -> Result<Option<Value>> {
        Ok(self.shared.lock().arena.get(job)?.result().cloned())
    }

    pub fn failure(&self, job: JobId) -> Result<Option<JobError>> {
        Ok(self.shared.lock().arena.get(job)?.failure().cloned())
    }

    pub fn name(&self, job: JobId) -> Result<String> {
        Ok(self.shared.lock().arena.get(job)?.name().to_string())
    }

    pub fn job_status(&self, job: JobId) -> Result<JobStatus> {
        let state = self.shared.lock();
        state.arena.get(job)?;
        Ok(state.arena.status(job))
    }

    /// Jobs handed to a worker so far, in dispatch order, whatever their outcome.
    pub fn dispatched(&self) -> Vec<JobId> {
        self.shared.lock().dispatched.clone()
    }

    pub fn pending(&self) -> Vec<JobId> {
        self.shared.lock().arena.pending().collect()
    }

    /// Pending jobs that can never become ready because a dependency failed.
    pub fn stalled(&self) -> Vec<JobId> {
        let state = self.shared.lock();
        state
            .arena
            .pending()
            .filter(|id| state.arena.is_stalled(*id))
            .collect()
    }

    pub fn status(&self) -> Vec<WorkerStatus> {
        worker_status(&self.shared.lock())
    }

    pub fn task_list(&self) -> TaskList {
        let state = self.shared.lock();
        TaskList {
            workers: worker_status(&state),
            pending: state.arena.pending().map(|id| state.arena.status(id)).collect(),
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_status(state: &PoolState) -> Vec<WorkerStatus> {
    state
        .workers
        .iter()
        .map(|worker| WorkerStatus {
            active: !worker.ready(),
            job: worker.job().map(|id| state.arena.status(id)),
        })
        .collect()
}

/// Pairs the earliest submitted ready job with the first idle worker until the
/// pool is disabled.
fn dispatcher_loop(shared: &Shared) {
    debug!("dispatcher started");
    let mut state = shared.lock();
    while state.enabled {
        let next = match state.find_worker() {
            Some(worker) => state.arena.dispatch_next().map(|id| (id, worker)),
            None => None,
        };
        let Some((id, worker)) = next else {
            state = shared.wait_pool(state);
            continue;
        };

        state.workers[worker].assign(id);
        state.dispatched.push(id);
        debug!(
            "Dispatched job {} to worker {}",
            state.arena.job(id).name(),
            worker
        );
        shared.worker_signals[worker].notify_all();
        shared.pool_signal.notify_all();
    }
    debug!("dispatcher stopped");
}
