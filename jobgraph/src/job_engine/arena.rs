// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::collections::{BTreeMap, BTreeSet, HashMap};

use log::{debug, warn};
use serde_json::Value;

use crate::job_engine::error::{JobEngineError, JobError, Result};
use crate::job_engine::job::{Job, JobId, JobState, JobStatus};

/// A job plus the graph bookkeeping kept up to date on every edge, submission and
/// completion, so that dispatching never walks the graph.
#[derive(Debug)]
struct Node {
    job: Job,
    /// Jobs that list this one as a dependency.
    dependents: Vec<JobId>,
    /// Dependencies that have not completed yet; the job is ready at zero.
    unmet: usize,
    /// Set once a dependency, directly or transitively, has failed.
    stalled: bool,
    /// Submission sequence number while the job sits in the pending queue.
    queued: Option<u64>,
}

/// Owns every job a scheduler knows about, plus the pending queue. Jobs are never
/// removed, so a `JobId` stays valid for the lifetime of the scheduler.
#[derive(Debug, Default)]
pub(crate) struct JobArena {
    nodes: Vec<Node>,
    /// Submitted jobs not yet dispatched, keyed by submission sequence.
    pending: BTreeMap<u64, JobId>,
    /// The entries of `pending` whose dependencies have all completed.
    ready: BTreeSet<(u64, JobId)>,
    next_seq: u64,
}

impl JobArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, job: Job) -> Result<JobId> {
        for dependency in job.dependencies() {
            self.get(*dependency)?;
        }
        let id = JobId(self.nodes.len());
        let mut unmet = 0;
        let mut stalled = false;
        for dependency in job.dependencies() {
            let node = &mut self.nodes[dependency.0];
            node.dependents.push(id);
            if !node.job.is_complete() {
                unmet += 1;
            }
            stalled |= node.stalled || node.job.state() == JobState::Failed;
        }
        self.nodes.push(Node {
            job,
            dependents: Vec::new(),
            unmet,
            stalled,
            queued: None,
        });
        Ok(id)
    }

    pub(crate) fn get(&self, id: JobId) -> Result<&Job> {
        self.nodes
            .get(id.0)
            .map(|node| &node.job)
            .ok_or(JobEngineError::UnknownJob(id))
    }

    /// Caller must hold a valid id; the scheduler only stores ids it handed out.
    pub(crate) fn job(&self, id: JobId) -> &Job {
        &self.nodes[id.0].job
    }

    pub(crate) fn job_mut(&mut self, id: JobId) -> &mut Job {
        &mut self.nodes[id.0].job
    }

    /// Adds `dependencies` as predecessors of `id`. Rejects edges that would close a
    /// cycle; on error the graph is unchanged.
    pub(crate) fn add_dependencies(&mut self, id: JobId, dependencies: &[JobId]) -> Result<()> {
        for dependency in dependencies {
            self.check_edge(id, *dependency)?;
        }
        for dependency in dependencies {
            self.link(*dependency, id);
        }
        Ok(())
    }

    /// Adds `id` as a predecessor of each of `dependents`, all or nothing.
    pub(crate) fn add_dependents(&mut self, id: JobId, dependents: &[JobId]) -> Result<()> {
        for dependent in dependents {
            self.check_edge(*dependent, id)?;
        }
        for dependent in dependents {
            self.link(id, *dependent);
        }
        Ok(())
    }

    fn check_edge(&self, id: JobId, dependency: JobId) -> Result<()> {
        match self.get(id)?.state() {
            JobState::Created | JobState::Submitted => {}
            _ => return Err(JobEngineError::AlreadyDispatched(id)),
        }
        self.get(dependency)?;
        match self.path_between(id, dependency) {
            Some(path) => Err(JobEngineError::DependencyCycle {
                job: id,
                dependency,
                path: self.describe_path(&path),
            }),
            None => Ok(()),
        }
    }

    /// Records that `dependent` runs after `dependency`. The edge must have passed
    /// `check_edge`.
    fn link(&mut self, dependency: JobId, dependent: JobId) {
        if self.job(dependent).dependencies().contains(&dependency) {
            return;
        }
        self.nodes[dependent.0].job.push_dependencies(&[dependency]);

        let node = &mut self.nodes[dependency.0];
        node.dependents.push(dependent);
        let complete = node.job.is_complete();
        let failed = node.stalled || node.job.state() == JobState::Failed;

        if !complete {
            let node = &mut self.nodes[dependent.0];
            node.unmet += 1;
            if node.unmet == 1 {
                if let Some(seq) = node.queued {
                    self.ready.remove(&(seq, dependent));
                }
            }
        }
        if failed && self.stall(vec![dependent]) > 0 && self.nodes[dependent.0].queued.is_some() {
            warn!(
                "Job {} will never run: a dependency failed",
                self.job(dependent).name()
            );
        }
    }

    /// Follows dependent edges from `from` and returns the chain reaching `to`,
    /// listed from `to` back to `from`.
    fn path_between(&self, from: JobId, to: JobId) -> Option<Vec<JobId>> {
        let mut parents: HashMap<JobId, Option<JobId>> = HashMap::from([(from, None)]);
        let mut stack = vec![from];
        while let Some(current) = stack.pop() {
            if current == to {
                let mut path = vec![current];
                let mut step = parents[&current];
                while let Some(previous) = step {
                    path.push(previous);
                    step = parents[&previous];
                }
                return Some(path);
            }
            for next in &self.nodes[current.0].dependents {
                if !parents.contains_key(next) {
                    parents.insert(*next, Some(current));
                    stack.push(*next);
                }
            }
        }
        None
    }

    fn describe_path(&self, path: &[JobId]) -> String {
        let mut names: Vec<&str> = path.iter().map(|id| self.job(*id).name()).collect();
        // the rejected edge closes the loop
        names.push(self.job(path[0]).name());
        names.join(" -> ")
    }

    /// Marks the given jobs and everything downstream of them as stalled. Returns how
    /// many jobs were newly marked.
    fn stall(&mut self, mut worklist: Vec<JobId>) -> usize {
        let mut marked = 0;
        while let Some(id) = worklist.pop() {
            let node = &mut self.nodes[id.0];
            if node.stalled {
                continue;
            }
            node.stalled = true;
            marked += 1;
            debug!("Job {} stalled", node.job.name());
            worklist.extend_from_slice(&node.dependents);
        }
        marked
    }

    /// True iff every predecessor has completed successfully.
    pub(crate) fn is_ready(&self, id: JobId) -> bool {
        self.nodes[id.0].unmet == 0
    }

    /// True if some predecessor, directly or transitively, has failed. Such a job can
    /// never become ready.
    pub(crate) fn is_stalled(&self, id: JobId) -> bool {
        self.nodes[id.0].stalled
    }

    /// Appends a job to the pending queue. The caller has checked that it is still
    /// `Created`.
    pub(crate) fn enqueue(&mut self, id: JobId) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let node = &mut self.nodes[id.0];
        node.job.set_state(JobState::Submitted);
        node.queued = Some(seq);
        self.pending.insert(seq, id);
        if node.unmet == 0 {
            self.ready.insert((seq, id));
        }
        if node.stalled {
            warn!("Job {} will never run: a dependency failed", node.job.name());
        }
    }

    /// Takes the earliest submitted ready job off the pending queue and marks it
    /// dispatched.
    pub(crate) fn dispatch_next(&mut self) -> Option<JobId> {
        let (seq, id) = self.ready.pop_first()?;
        self.pending.remove(&seq);
        let node = &mut self.nodes[id.0];
        node.queued = None;
        node.job.set_state(JobState::Dispatched);
        Some(id)
    }

    /// Records the outcome of a dispatched job. Success releases its dependents,
    /// failure stalls everything downstream.
    pub(crate) fn complete(&mut self, id: JobId, outcome: std::result::Result<Value, JobError>) {
        let node = &mut self.nodes[id.0];
        node.job.complete(outcome);
        let dependents = node.dependents.clone();

        if node.job.is_complete() {
            for dependent in dependents {
                let node = &mut self.nodes[dependent.0];
                node.unmet -= 1;
                if node.unmet == 0 {
                    if let Some(seq) = node.queued {
                        self.ready.insert((seq, dependent));
                    }
                }
            }
        } else {
            let marked = self.stall(dependents);
            if marked > 0 {
                warn!(
                    "{} jobs depending on {} will never run",
                    marked,
                    self.job(id).name()
                );
            }
        }
    }

    pub(crate) fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    pub(crate) fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Pending jobs in submission order.
    pub(crate) fn pending(&self) -> impl Iterator<Item = JobId> + '_ {
        self.pending.values().copied()
    }

    pub(crate) fn status(&self, id: JobId) -> JobStatus {
        let job = self.job(id);
        JobStatus {
            name: job.name().to_string(),
            start: job.start(),
            duration: job.duration(),
            finish: job.finish(),
            pending: job
                .dependencies()
                .iter()
                .map(|dependency| self.job(*dependency))
                .filter(|dependency| !dependency.is_complete())
                .map(|dependency| dependency.name().to_string())
                .collect(),
        }
    }
}
