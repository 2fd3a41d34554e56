// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use serde::Serialize;

use crate::job_engine::job::JobStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub active: bool,
    pub job: Option<JobStatus>,
}

/// Snapshot of the whole pool: what each worker is doing and what is still queued.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskList {
    pub workers: Vec<WorkerStatus>,
    /// Pending jobs in submission order.
    pub pending: Vec<JobStatus>,
}

impl TaskList {
    pub fn active_workers(&self) -> usize {
        self.workers.iter().filter(|worker| worker.active).count()
    }
}
