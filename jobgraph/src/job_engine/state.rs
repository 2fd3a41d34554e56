// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::job_engine::arena::JobArena;
use crate::job_engine::job::JobId;
use crate::job_engine::worker::WorkerSlot;

/// Everything the dispatcher, the workers and the callers share. All fields of
/// `PoolState` are only touched while holding `state`.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) state: Mutex<PoolState>,
    /// Signalled on submission, when a worker becomes free and on shutdown.
    pub(crate) pool_signal: Condvar,
    /// One per worker, signalled when that worker gets a job or is told to stop.
    pub(crate) worker_signals: Vec<Condvar>,
}

impl Shared {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            state: Mutex::new(PoolState::new(workers)),
            pool_signal: Condvar::new(),
            worker_signals: (0..workers).map(|_| Condvar::new()).collect(),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_pool<'a>(&self, guard: MutexGuard<'a, PoolState>) -> MutexGuard<'a, PoolState> {
        self.pool_signal
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_worker<'a>(
        &self,
        index: usize,
        guard: MutexGuard<'a, PoolState>,
    ) -> MutexGuard<'a, PoolState> {
        self.worker_signals[index]
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub(crate) struct PoolState {
    /// The job graph and the pending queue.
    pub(crate) arena: JobArena,
    pub(crate) workers: Vec<WorkerSlot>,
    /// Every job handed to a worker, in dispatch order.
    pub(crate) dispatched: Vec<JobId>,
    /// Cleared when shutdown begins; submissions are rejected from then on.
    pub(crate) accepting: bool,
    /// Cleared once the pending queue is drained during shutdown; stops the dispatcher.
    pub(crate) enabled: bool,
}

impl PoolState {
    fn new(workers: usize) -> Self {
        Self {
            arena: JobArena::new(),
            workers: (0..workers).map(WorkerSlot::new).collect(),
            dispatched: Vec::new(),
            accepting: true,
            enabled: true,
        }
    }

    pub(crate) fn find_worker(&self) -> Option<usize> {
        self.workers.iter().position(WorkerSlot::ready)
    }

    pub(crate) fn any_worker_occupied(&self) -> bool {
        self.workers.iter().any(|worker| !worker.ready())
    }

    /// Nothing runs and nothing can be dispatched, so nothing will change until
    /// the next submission.
    pub(crate) fn is_quiescent(&self) -> bool {
        !self.any_worker_occupied() && !self.arena.has_ready()
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.arena.pending_len() == 0 || self.is_quiescent()
    }
}
