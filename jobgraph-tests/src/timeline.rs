// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::{Arc, Mutex};

use jobgraph::job_engine::Job;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    End,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TimelineEvent {
    pub seq: usize,

    pub job: String,

    pub kind: EventKind,
}

/// Records when jobs start and end, in one global order across all workers.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    events: Arc<Mutex<Vec<TimelineEvent>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, job: &str, kind: EventKind) {
        let mut events = self.events.lock().unwrap();
        let seq = events.len();
        debug!("timeline {seq}: {job} {kind:?}");
        events.push(TimelineEvent {
            seq,
            job: job.to_string(),
            kind,
        });
    }

    /// A job that only records its start and end.
    pub fn job(&self, name: &str) -> Job {
        self.job_with(name, |_| Ok(Value::Null))
    }

    /// Like `job`, running `body` between the two events. The job's result is `body`'s.
    pub fn job_with<F>(&self, name: &str, body: F) -> Job
    where
        F: FnOnce(&[Value]) -> anyhow::Result<Value> + Send + 'static,
    {
        let timeline = self.clone();
        let own_name = name.to_string();
        Job::new(name, move |args| {
            timeline.record(&own_name, EventKind::Start);
            let result = body(args);
            timeline.record(&own_name, EventKind::End);
            result
        })
    }

    pub fn events(&self) -> Vec<TimelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn position(&self, job: &str, kind: EventKind) -> Option<usize> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|event| event.job == job && event.kind == kind)
            .map(|event| event.seq)
    }

    /// Names of started jobs, in start order.
    pub fn started(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|event| event.kind == EventKind::Start)
            .map(|event| event.job.clone())
            .collect()
    }

    pub fn ran(&self, job: &str) -> bool {
        self.position(job, EventKind::Start).is_some()
    }
}
