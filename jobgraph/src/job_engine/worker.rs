// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::job_engine::error::Result;
use crate::job_engine::job::JobId;
use crate::job_engine::state::Shared;

/// The assignment slot of one worker. Lives in the pool state and is only
/// touched under the pool lock.
#[derive(Debug)]
pub(crate) struct WorkerSlot {
    index: usize,
    job: Option<JobId>,
    running: bool,
}

impl WorkerSlot {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            job: None,
            running: true,
        }
    }

    pub(crate) fn ready(&self) -> bool {
        self.job.is_none()
    }

    pub(crate) fn job(&self) -> Option<JobId> {
        self.job
    }

    /// Panics if the worker is occupied; the dispatcher only picks ready workers.
    pub(crate) fn assign(&mut self, job: JobId) {
        if let Some(current) = self.job {
            panic!(
                "worker {} double scheduled: got {} while still running {}",
                self.index, job, current
            );
        }
        self.job = Some(job);
    }

    fn clear(&mut self) {
        self.job = None;
    }
}

/// A dedicated thread that runs at most one job at a time.
#[derive(Debug)]
pub(crate) struct Worker {
    index: usize,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(shared: Arc<Shared>, index: usize, thread_name: &str) -> Result<Self> {
        let handle = thread::Builder::new()
            .name(format!("{thread_name}-{index}"))
            .spawn(move || worker_loop(&shared, index))?;
        Ok(Self {
            index,
            handle: Some(handle),
        })
    }

    /// Lets an in-flight job finish, then stops the thread.
    pub(crate) fn shutdown(&mut self, shared: &Shared) {
        {
            let mut state = shared.lock();
            state.workers[self.index].running = false;
        }
        shared.worker_signals[self.index].notify_all();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("worker {} terminated abnormally", self.index);
            }
        }
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    debug!("worker {index} started");
    let mut state = shared.lock();
    loop {
        let id = match state.workers[index].job {
            Some(id) => id,
            None if !state.workers[index].running => break,
            None => {
                state = shared.wait_worker(index, state);
                continue;
            }
        };

        let Some(task) = state.arena.job_mut(id).begin() else {
            error!("worker {index} got job {id}, which already ran");
            state.workers[index].clear();
            shared.pool_signal.notify_all();
            continue;
        };
        drop(state);
        // the body runs outside the pool lock
        let outcome = task.run();
        state = shared.lock();

        state.arena.complete(id, outcome);
        state.workers[index].clear();
        shared.pool_signal.notify_all();
    }
    debug!("worker {index} stopped");
}
