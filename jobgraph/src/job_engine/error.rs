// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use thiserror::Error;

use crate::job_engine::job::JobId;

#[derive(Error, Debug)]
pub enum JobEngineError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),

    #[error("job {0} was already submitted")]
    AlreadySubmitted(JobId),

    #[error("job {0} was already dispatched, its dependencies can no longer change")]
    AlreadyDispatched(JobId),

    #[error("dependency {dependency} -> {job} would close a cycle: {path}")]
    DependencyCycle {
        job: JobId,
        dependency: JobId,
        path: String,
    },

    #[error("scheduler is shut down")]
    ShutDown,

    #[error("worker count must be at least 1")]
    InvalidWorkerCount,

    #[error("failed to spawn thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, JobEngineError>;

/// Failure value captured on a job whose body did not succeed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    #[error("{0}")]
    Failed(String),

    #[error("panicked: {0}")]
    Panicked(String),
}
