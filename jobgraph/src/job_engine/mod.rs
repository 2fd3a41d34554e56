// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! # Design: Dependency-Aware Thread Pool
//!
//! ## Overview
//! A fixed pool of worker threads runs jobs that form a directed acyclic graph.
//!
//! - Jobs live in an arena owned by the scheduler and refer to each other by `JobId`.
//! - One dispatcher thread pairs the earliest submitted ready job with an idle worker.
//! - A job is ready once every dependency has completed successfully.
//! - A failed job never completes, so its dependents stay pending forever.
//! - Shutdown drains the pending queue, then joins the dispatcher and every worker.
//!
//! ## Locking
//! - One mutex guards the whole pool state: arena, pending queue, worker slots.
//! - The pool condvar wakes the dispatcher and waiters; each worker has its own condvar.
//! - Job bodies run outside the lock.
//!
//! ```text
//!         +---------+  submit   +---------------+
//!         | caller  +---------->| pending queue |
//!         +---------+           +-------+-------+
//!                                       |
//!                                       v
//!                              +--------+--------+
//!                              |   dispatcher    |
//!                              +--+-----+-----+--+
//!                                 |     |     |   assign
//!                            +----v-+ +-v----+ +v-----+
//!                            |  W0  | |  W1  | |  Wn  |
//!                            +------+ +------+ +------+
//! ```

pub mod error;
pub mod job;
pub mod scheduler;
pub mod status;

mod arena;
mod state;
mod worker;

pub use error::{JobEngineError, JobError, Result};
pub use job::{Job, JobBody, JobId, JobState, JobStatus};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use status::{TaskList, WorkerStatus};

#[cfg(test)]
mod tests;
