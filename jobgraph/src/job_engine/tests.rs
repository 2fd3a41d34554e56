use super::arena::JobArena;
use super::worker::WorkerSlot;
use super::*;

use anyhow::bail;
use serde_json::{json, Value};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Shared list of job names in execution order
fn shared_log() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn logging_job(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Job {
    let log = log.clone();
    let entry = name.to_string();
    Job::new(name, move |_| {
        log.lock().unwrap().push(entry);
        Ok(Value::Null)
    })
}

/// A job that blocks its worker until the returned sender is used or dropped.
fn gate_job(name: &str) -> (Job, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let job = Job::new(name, move |_| {
        let _ = gate.recv();
        Ok(Value::Null)
    });
    (job, release)
}

fn wait_for_state(scheduler: &Scheduler, id: JobId, expected: JobState) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while scheduler.state(id).unwrap() != expected {
        assert!(
            Instant::now() < deadline,
            "job {id} did not reach {expected:?}, still {:?}",
            scheduler.state(id).unwrap()
        );
        thread::sleep(Duration::from_millis(1));
    }
}

//
// 1. Ordering test: one worker, two ready jobs, the earlier submission runs first
//
#[test]
fn test_job_ordering() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let log = shared_log();

    let (gate, release) = gate_job("gate");
    let gate = scheduler.spawn(gate).unwrap();
    wait_for_state(&scheduler, gate, JobState::Dispatched);

    let a = scheduler.create(logging_job("A", &log)).unwrap();
    let b = scheduler.create(logging_job("B", &log)).unwrap();
    scheduler.submit(&[a, b]).unwrap();
    release.send(()).unwrap();

    scheduler.shutdown();

    assert_eq!(*log.lock().unwrap(), vec!["A".to_string(), "B".to_string()]);
    assert_eq!(scheduler.dispatched(), vec![gate, a, b]);
}

//
// 2. Readiness
//
#[test]
fn test_job_without_dependencies_is_ready() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let id = scheduler.create(Job::unnamed(|_| Ok(Value::Null))).unwrap();

    assert!(scheduler.is_ready(id).unwrap());
    assert_eq!(scheduler.state(id).unwrap(), JobState::Created);
    assert_eq!(scheduler.name(id).unwrap(), "Unnamed");
}

#[test]
fn test_dependent_waits_for_dependency() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let (gate, release) = gate_job("gate");
    let gate = scheduler.create(gate).unwrap();
    let after = scheduler
        .create(Job::new("after", |_| Ok(json!("done"))).add_dependencies(&[gate]))
        .unwrap();

    assert!(!scheduler.is_ready(after).unwrap());
    scheduler.submit(&[gate, after]).unwrap();
    wait_for_state(&scheduler, gate, JobState::Dispatched);

    // a second worker is idle, but the dependency is still running
    assert_eq!(scheduler.state(after).unwrap(), JobState::Submitted);
    assert_eq!(scheduler.job_status(after).unwrap().pending, vec!["gate"]);

    release.send(()).unwrap();
    scheduler.shutdown();

    assert!(scheduler.is_complete(after).unwrap());
    assert_eq!(scheduler.result(after).unwrap(), Some(json!("done")));
    assert!(scheduler.job_status(after).unwrap().pending.is_empty());
}

//
// 3. Running a job directly
//
#[test]
fn test_run_records_result_and_timestamps() {
    let mut job = Job::new("sum", |args| {
        let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
        Ok(json!(sum))
    })
    .with_args([json!(1), json!(2), json!(3)]);

    job.run();

    assert!(job.is_complete());
    assert_eq!(job.result(), Some(&json!(6)));
    assert!(job.failure().is_none());
    assert!(job.start().is_some());
    assert!(job.finish().is_some());
    assert!(job.start() <= job.finish());
    assert!(job.duration().is_some());
}

#[test]
fn test_run_captures_error() {
    let mut job = Job::new("broken", |_| bail!("disk full"));

    job.run();

    assert!(!job.is_complete());
    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(job.failure(), Some(&JobError::Failed("disk full".into())));
    assert!(job.result().is_none());
    assert!(job.start().is_some());
    assert!(job.finish().is_none());
}

#[test]
fn test_run_captures_panic() {
    let mut job = Job::new("panicking", |_| panic!("intentional test panic"));

    job.run();

    assert_eq!(job.state(), JobState::Failed);
    assert_eq!(
        job.failure(),
        Some(&JobError::Panicked("intentional test panic".into()))
    );
}

#[test]
fn test_second_run_keeps_first_outcome() {
    let runs = Arc::new(Mutex::new(0));
    let counter = runs.clone();
    let mut job = Job::new("once", move |args| {
        *counter.lock().unwrap() += 1;
        Ok(args[0].clone())
    })
    .with_args([json!("payload")]);

    job.run();
    let finish = job.finish();
    job.run();

    assert_eq!(*runs.lock().unwrap(), 1);
    assert_eq!(job.state(), JobState::Completed);
    assert_eq!(job.result(), Some(&json!("payload")));
    assert_eq!(job.finish(), finish);
    assert_eq!(job.args(), &[json!("payload")]);
}

#[test]
fn test_panicking_job_does_not_kill_worker() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let log = shared_log();

    let bad = scheduler
        .spawn(Job::new("bad", |_| panic!("intentional test panic")))
        .unwrap();
    let good = scheduler.spawn(logging_job("good", &log)).unwrap();
    scheduler.shutdown();

    assert_eq!(scheduler.state(bad).unwrap(), JobState::Failed);
    assert!(scheduler.is_complete(good).unwrap());
    assert_eq!(*log.lock().unwrap(), vec!["good".to_string()]);
}

//
// 4. Worker occupancy
//
#[test]
fn test_worker_slot_assignment() {
    let mut slot = WorkerSlot::new(0);
    assert!(slot.ready());

    slot.assign(JobId(3));

    assert!(!slot.ready());
    assert_eq!(slot.job(), Some(JobId(3)));
}

#[test]
#[should_panic(expected = "double scheduled")]
fn test_worker_double_assignment_panics() {
    let mut slot = WorkerSlot::new(0);
    slot.assign(JobId(0));
    slot.assign(JobId(1));
}

//
// 5. Graph construction
//
#[test]
fn test_cycle_is_rejected() {
    let mut arena = JobArena::new();
    let a = arena.insert(Job::new("a", |_| Ok(Value::Null))).unwrap();
    let b = arena
        .insert(Job::new("b", |_| Ok(Value::Null)).add_dependencies(&[a]))
        .unwrap();
    let c = arena
        .insert(Job::new("c", |_| Ok(Value::Null)).add_dependencies(&[b]))
        .unwrap();

    match arena.add_dependencies(a, &[c]) {
        Err(JobEngineError::DependencyCycle { job, dependency, path }) => {
            assert_eq!(job, a);
            assert_eq!(dependency, c);
            assert_eq!(path, "c -> b -> a -> c");
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }
    assert!(arena.job(a).dependencies().is_empty());
}

#[test]
fn test_self_dependency_is_rejected() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let a = scheduler.create(Job::new("a", |_| Ok(Value::Null))).unwrap();

    assert!(matches!(
        scheduler.add_dependencies(a, &[a]),
        Err(JobEngineError::DependencyCycle { .. })
    ));
}

#[test]
fn test_add_dependents_is_inverse_edge() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let first = scheduler.create(Job::new("first", |_| Ok(Value::Null))).unwrap();
    let second = scheduler.create(Job::new("second", |_| Ok(Value::Null))).unwrap();
    let third = scheduler.create(Job::new("third", |_| Ok(Value::Null))).unwrap();

    let returned = scheduler.add_dependents(first, &[second, third]).unwrap();

    assert_eq!(returned, first);
    assert_eq!(scheduler.job_status(second).unwrap().pending, vec!["first"]);
    assert_eq!(scheduler.job_status(third).unwrap().pending, vec!["first"]);
    assert!(scheduler.job_status(first).unwrap().pending.is_empty());
}

#[test]
fn test_add_dependents_is_all_or_nothing() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let a = scheduler.create(Job::new("a", |_| Ok(Value::Null))).unwrap();
    let b = scheduler.create(Job::new("b", |_| Ok(Value::Null))).unwrap();
    scheduler.add_dependencies(a, &[b]).unwrap();

    // b -> a would close a cycle, so c must not get the edge either
    let c = scheduler.create(Job::new("c", |_| Ok(Value::Null))).unwrap();
    assert!(scheduler.add_dependents(a, &[c, b]).is_err());
    assert!(scheduler.job_status(c).unwrap().pending.is_empty());
}

#[test]
fn test_unknown_dependency_is_rejected() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let result = scheduler.create(Job::new("orphan", |_| Ok(Value::Null)).add_dependencies(&[JobId(42)]));

    assert!(matches!(result, Err(JobEngineError::UnknownJob(JobId(42)))));
}

#[test]
fn test_edges_cannot_change_after_dispatch() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let done = scheduler.spawn(Job::new("done", |_| Ok(Value::Null))).unwrap();
    scheduler.wait_idle();
    let other = scheduler.create(Job::new("other", |_| Ok(Value::Null))).unwrap();

    assert!(matches!(
        scheduler.add_dependencies(done, &[other]),
        Err(JobEngineError::AlreadyDispatched(id)) if id == done
    ));
}

//
// 6. Submission rules
//
#[test]
fn test_double_submission_is_rejected() {
    let scheduler = Scheduler::with_workers(1).unwrap();
    let a = scheduler.create(Job::new("a", |_| Ok(Value::Null))).unwrap();

    assert!(matches!(
        scheduler.submit(&[a, a]),
        Err(JobEngineError::AlreadySubmitted(_))
    ));
    scheduler.submit(&[a]).unwrap();
    assert!(matches!(
        scheduler.submit(&[a]),
        Err(JobEngineError::AlreadySubmitted(_))
    ));
}

#[test]
fn test_no_jobs_after_shutdown() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    scheduler.shutdown();

    assert!(matches!(
        scheduler.spawn(Job::new("late", |_| Ok(Value::Null))),
        Err(JobEngineError::ShutDown)
    ));
    assert!(scheduler.dispatched().is_empty());
}

#[test]
fn test_zero_workers_is_rejected() {
    assert!(matches!(
        Scheduler::with_workers(0),
        Err(JobEngineError::InvalidWorkerCount)
    ));
}

#[test]
fn test_default_worker_count_uses_available_parallelism() {
    let expected = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
    assert_eq!(SchedulerConfig::default().worker_count().unwrap(), expected);

    let scheduler = Scheduler::with_default_workers().unwrap();
    assert_eq!(scheduler.worker_count(), expected);
}

//
// 7. Stalls
//
#[test]
fn test_stall_is_transitive() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let root = scheduler.create(Job::new("root", |_| bail!("boom"))).unwrap();
    let child = scheduler
        .create(Job::new("child", |_| Ok(Value::Null)).add_dependencies(&[root]))
        .unwrap();
    let grandchild = scheduler
        .create(Job::new("grandchild", |_| Ok(Value::Null)).add_dependencies(&[child]))
        .unwrap();
    let unrelated = scheduler.create(Job::new("unrelated", |_| Ok(json!(1)))).unwrap();

    scheduler.submit(&[root, child, grandchild, unrelated]).unwrap();
    scheduler.shutdown();

    assert_eq!(scheduler.stalled(), vec![child, grandchild]);
    assert_eq!(scheduler.pending(), vec![child, grandchild]);
    assert!(scheduler.is_complete(unrelated).unwrap());

    let task_list = scheduler.task_list();
    let names: Vec<&str> = task_list.pending.iter().map(|job| job.name.as_str()).collect();
    assert_eq!(names, vec!["child", "grandchild"]);
    assert_eq!(task_list.pending[0].pending, vec!["root"]);
    assert_eq!(task_list.active_workers(), 0);
}

fn arena_job(arena: &mut JobArena, name: &str, dependencies: &[JobId]) -> JobId {
    arena
        .insert(Job::new(name, |_| Ok(Value::Null)).add_dependencies(dependencies))
        .unwrap()
}

/// Dispatches the next ready job, which must be `expected`, and records `outcome`.
fn finish_next(
    arena: &mut JobArena,
    expected: JobId,
    outcome: std::result::Result<Value, JobError>,
) {
    assert_eq!(arena.dispatch_next(), Some(expected));
    arena.complete(expected, outcome);
}

#[test]
fn test_failure_stalls_every_downstream_job_once() {
    let mut arena = JobArena::new();
    let root = arena_job(&mut arena, "root", &[]);
    let left = arena_job(&mut arena, "left", &[root]);
    let right = arena_job(&mut arena, "right", &[root]);
    let join = arena_job(&mut arena, "join", &[left, right]);
    let other = arena_job(&mut arena, "other", &[]);
    for id in [root, left, right, join, other] {
        arena.enqueue(id);
    }

    finish_next(&mut arena, root, Err(JobError::Failed("boom".into())));

    assert!(arena.is_stalled(left));
    assert!(arena.is_stalled(right));
    assert!(arena.is_stalled(join));
    assert!(!arena.is_stalled(other));
    finish_next(&mut arena, other, Ok(Value::Null));
    assert_eq!(arena.dispatch_next(), None);
    assert_eq!(arena.pending().collect::<Vec<_>>(), vec![left, right, join]);
}

#[test]
fn test_edge_to_failed_job_stalls_dependent() {
    let mut arena = JobArena::new();
    let broken = arena_job(&mut arena, "broken", &[]);
    arena.enqueue(broken);
    finish_next(&mut arena, broken, Err(JobError::Failed("boom".into())));

    let late = arena_job(&mut arena, "late", &[]);
    let later = arena_job(&mut arena, "later", &[late]);
    assert!(!arena.is_stalled(later));

    arena.add_dependencies(late, &[broken]).unwrap();

    assert!(arena.is_stalled(late));
    assert!(arena.is_stalled(later));
    let created_after = arena_job(&mut arena, "created-after", &[broken]);
    assert!(arena.is_stalled(created_after));
}

#[test]
fn test_new_dependency_holds_back_queued_job() {
    let mut arena = JobArena::new();
    let first = arena_job(&mut arena, "first", &[]);
    let second = arena_job(&mut arena, "second", &[]);
    arena.enqueue(second);
    assert!(arena.has_ready());

    arena.add_dependencies(second, &[first]).unwrap();
    assert!(!arena.has_ready());
    assert!(!arena.is_ready(second));

    arena.enqueue(first);
    finish_next(&mut arena, first, Ok(Value::Null));
    assert!(arena.is_ready(second));
    finish_next(&mut arena, second, Ok(Value::Null));
    assert_eq!(arena.pending_len(), 0);
}

#[test]
fn test_edge_to_completed_job_keeps_readiness() {
    let mut arena = JobArena::new();
    let done = arena_job(&mut arena, "done", &[]);
    arena.enqueue(done);
    finish_next(&mut arena, done, Ok(Value::Null));

    let next = arena_job(&mut arena, "next", &[]);
    arena.enqueue(next);
    arena.add_dependencies(next, &[done]).unwrap();

    assert!(arena.is_ready(next));
    assert_eq!(arena.dispatch_next(), Some(next));
}

#[test]
fn test_cycle_path_lists_one_branch() {
    let mut arena = JobArena::new();
    let a = arena_job(&mut arena, "a", &[]);
    let b = arena_job(&mut arena, "b", &[a]);
    let side = arena_job(&mut arena, "side", &[a]);
    let c = arena_job(&mut arena, "c", &[b, side]);
    let d = arena_job(&mut arena, "d", &[c]);

    let err = arena.add_dependencies(a, &[d]).unwrap_err();
    let JobEngineError::DependencyCycle { path, .. } = err else {
        panic!("expected a cycle error, got {err:?}");
    };
    assert!(path.starts_with("d -> c -> "), "{path}");
    assert!(path.ends_with(" -> a -> d"), "{path}");
    assert!(arena.job(a).dependencies().is_empty());
    assert!(arena.add_dependencies(d, &[side]).is_ok());
}

//
// 8. Status snapshots
//
#[test]
fn test_status_reports_active_job() {
    let scheduler = Scheduler::with_workers(2).unwrap();
    let (gate, release) = gate_job("gate");
    let gate = scheduler.spawn(gate).unwrap();
    wait_for_state(&scheduler, gate, JobState::Dispatched);

    let status = scheduler.status();
    assert_eq!(status.len(), 2);
    let active: Vec<&WorkerStatus> = status.iter().filter(|worker| worker.active).collect();
    assert_eq!(active.len(), 1);
    let job = active[0].job.as_ref().unwrap();
    assert_eq!(job.name, "gate");
    assert!(job.finish.is_none());

    release.send(()).unwrap();
    scheduler.wait_idle();
    assert!(scheduler.status().iter().all(|worker| !worker.active && worker.job.is_none()));
}

#[test]
fn test_job_status_serializes() {
    let mut job = Job::new("serialized", |_| Ok(Value::Null));
    job.run();
    let mut arena = JobArena::new();
    let id = arena.insert(job).unwrap();

    let value = serde_json::to_value(arena.status(id)).unwrap();

    assert_eq!(value["name"], "serialized");
    assert!(value["start"].is_string());
    assert!(value["finish"].is_string());
    assert!(value["duration"].is_f64());
    assert_eq!(value["pending"], json!([]));
}
