// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

use crate::job_engine::error::JobError;

/// The callable of a job. It receives the job's positional arguments.
pub type JobBody = Box<dyn FnOnce(&[Value]) -> anyhow::Result<Value> + Send + 'static>;

/// Handle of a job inside a scheduler's arena. Dependency edges are lists of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub(crate) usize);

impl JobId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Created -> Submitted -> Dispatched -> Completed | Failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobState {
    Created,
    Submitted,
    Dispatched,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Point-in-time snapshot of a job, the data behind one row of a task list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub name: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Option<Duration>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub finish: Option<OffsetDateTime>,
    /// Names of the dependencies that have not completed yet.
    pub pending: Vec<String>,
}

fn serialize_secs<S: serde::Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(d) => serializer.serialize_some(&d.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

pub struct Job {
    name: String,
    body: Option<JobBody>,
    args: Vec<Value>,
    dependencies: Vec<JobId>,
    state: JobState,
    start: Option<OffsetDateTime>,
    finish: Option<OffsetDateTime>,
    started: Option<Instant>,
    ended: Option<Instant>,
    result: Option<Value>,
    failure: Option<JobError>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("dependencies", &self.dependencies)
            .finish()
    }
}

impl Job {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: FnOnce(&[Value]) -> anyhow::Result<Value> + Send + 'static,
    {
        Self {
            name: name.into(),
            body: Some(Box::new(body)),
            args: Vec::new(),
            dependencies: Vec::new(),
            state: JobState::Created,
            start: None,
            finish: None,
            started: None,
            ended: None,
            result: None,
            failure: None,
        }
    }

    pub fn unnamed<F>(body: F) -> Self
    where
        F: FnOnce(&[Value]) -> anyhow::Result<Value> + Send + 'static,
    {
        Self::new("Unnamed", body)
    }

    pub fn with_args(mut self, args: impl IntoIterator<Item = Value>) -> Self {
        self.args = args.into_iter().collect();
        self
    }

    /// Adds predecessors before the job is placed in a scheduler.
    pub fn add_dependencies(mut self, dependencies: &[JobId]) -> Self {
        self.push_dependencies(dependencies);
        self
    }

    pub(crate) fn push_dependencies(&mut self, dependencies: &[JobId]) {
        for dependency in dependencies {
            if !self.dependencies.contains(dependency) {
                self.dependencies.push(*dependency);
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn dependencies(&self) -> &[JobId] {
        &self.dependencies
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        self.state = state;
    }

    /// The completion flag: true only after a successful run.
    pub fn is_complete(&self) -> bool {
        self.state == JobState::Completed
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn failure(&self) -> Option<&JobError> {
        self.failure.as_ref()
    }

    pub fn start(&self) -> Option<OffsetDateTime> {
        self.start
    }

    pub fn finish(&self) -> Option<OffsetDateTime> {
        self.finish
    }

    /// Time spent running so far, or in total once the body has returned.
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started?;
        Some(self.ended.unwrap_or_else(Instant::now).duration_since(started))
    }

    /// Runs the job to its terminal state on the calling thread. A job runs at most
    /// once; later calls leave the recorded outcome alone.
    pub fn run(&mut self) {
        let Some(task) = self.begin() else {
            warn!("Job {} already ran, not running it again", self.name);
            return;
        };
        let outcome = task.run();
        self.complete(outcome);
    }

    /// Records the start and hands out the body so it can run without holding the pool
    /// lock. `None` once the body has been handed out.
    pub(crate) fn begin(&mut self) -> Option<JobTask> {
        let body = self.body.take()?;
        self.start = Some(OffsetDateTime::now_utc());
        self.started = Some(Instant::now());
        debug!("Starting job {}", self.name);
        Some(JobTask {
            name: self.name.clone(),
            body,
            args: self.args.clone(),
        })
    }

    pub(crate) fn complete(&mut self, outcome: Result<Value, JobError>) {
        self.ended = Some(Instant::now());
        match outcome {
            Ok(value) => {
                self.finish = Some(OffsetDateTime::now_utc());
                self.result = Some(value);
                self.state = JobState::Completed;
                debug!("Job {} completed", self.name);
            }
            Err(failure) => {
                error!("Job {} failed: {}", self.name, failure);
                self.failure = Some(failure);
                self.state = JobState::Failed;
            }
        }
    }
}

/// The part of a job that leaves the arena while it executes.
pub(crate) struct JobTask {
    name: String,
    body: JobBody,
    args: Vec<Value>,
}

impl JobTask {
    pub(crate) fn run(self) -> Result<Value, JobError> {
        let JobTask { name, body, args } = self;
        match panic::catch_unwind(AssertUnwindSafe(move || body(&args))) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(JobError::Failed(format!("{err:#}"))),
            Err(payload) => {
                debug!("Job {} panicked", name);
                Err(JobError::Panicked(panic_message(payload.as_ref())))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
