// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>
//! Job plans: a JSON description of named jobs and the jobs they run after.
//!
//! ```json
//! { "jobs": [
//!     { "name": "build", "action": { "action": "shell", "command": "make" } },
//!     { "name": "test",  "action": { "action": "shell", "command": "make test" }, "after": ["build"] }
//! ] }
//! ```

use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{bail, Context};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::job_engine::{Job, JobId, JobState, Scheduler, SchedulerConfig, TaskList};

pub mod action;
pub mod handle_action;

use action::Action;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub jobs: Vec<PlanJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanJob {
    pub name: String,
    pub action: Action,
    /// Names of the jobs that must complete first.
    #[serde(default)]
    pub after: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub name: String,
    pub state: JobState,
    pub result: Option<Value>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    pub jobs: Vec<JobReport>,
    /// Pool snapshot after shutdown; `pending` lists the jobs that never ran.
    pub task_list: TaskList,
}

impl PlanReport {
    pub fn succeeded(&self) -> bool {
        self.jobs.iter().all(|job| job.state == JobState::Completed)
    }

    pub fn job(&self, name: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

impl Plan {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let plan: Plan = serde_json::from_str(json).context("invalid plan JSON")?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan {}", path.display()))?;
        Self::from_json(&json)
    }

    /// Checks that names are unique and every `after` entry names a job of the plan.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for job in &self.jobs {
            if !names.insert(job.name.as_str()) {
                bail!("duplicate job name '{}'", job.name);
            }
        }
        for job in &self.jobs {
            for dependency in &job.after {
                if !names.contains(dependency.as_str()) {
                    bail!("job '{}' runs after unknown job '{}'", job.name, dependency);
                }
            }
        }
        Ok(())
    }
}

/// Runs every job of the plan on a fresh scheduler and reports the outcome once the
/// scheduler has shut down.
pub fn run_plan(plan: &Plan, config: SchedulerConfig) -> anyhow::Result<PlanReport> {
    plan.validate()?;
    let scheduler = Scheduler::new(config)?;

    let mut ids = Vec::with_capacity(plan.jobs.len());
    let mut by_name = HashMap::new();
    for job in &plan.jobs {
        let action = serde_json::to_value(&job.action)?;
        let id = scheduler.create(
            Job::new(job.name.clone(), handle_action::run_action_args).with_args([action]),
        )?;
        by_name.insert(job.name.as_str(), id);
        ids.push(id);
    }
    for (job, id) in plan.jobs.iter().zip(&ids) {
        let dependencies: Vec<JobId> = job
            .after
            .iter()
            .map(|name| by_name[name.as_str()])
            .collect();
        scheduler
            .add_dependencies(*id, &dependencies)
            .with_context(|| format!("cannot order job '{}'", job.name))?;
    }

    info!("Running plan with {} jobs", ids.len());
    scheduler.submit(&ids)?;
    scheduler.shutdown();

    let mut jobs = Vec::with_capacity(ids.len());
    for id in &ids {
        jobs.push(JobReport {
            name: scheduler.name(*id)?,
            state: scheduler.state(*id)?,
            result: scheduler.result(*id)?,
            failure: scheduler.failure(*id)?.map(|failure| failure.to_string()),
        });
    }
    Ok(PlanReport {
        jobs,
        task_list: scheduler.task_list(),
    })
}
