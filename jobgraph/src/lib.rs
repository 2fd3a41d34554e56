// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Dependency-aware job scheduler: a fixed pool of worker threads running a job
//! graph, plus JSON job plans built on top of it.

pub mod global_config;
pub mod job_engine;
pub mod plan;
