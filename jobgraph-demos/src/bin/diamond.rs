// SPDX-License-Identifier: MIT
//
// Two independent jobs feed a third one that runs once both have completed.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::thread::sleep;
use std::time::Duration;

use jobgraph::job_engine::{Job, Scheduler};
use log::info;
use serde_json::{json, Value};

fn slow_square(args: &[Value]) -> anyhow::Result<Value> {
    let n = args.first().and_then(Value::as_i64).unwrap_or(0);
    sleep(Duration::from_millis(200));
    Ok(json!(n * n))
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let scheduler = Scheduler::with_workers(2)?;

    let left = scheduler.create(Job::new("left", slow_square).with_args([json!(3)]))?;
    let right = scheduler.create(Job::new("right", slow_square).with_args([json!(4)]))?;
    let announce = scheduler.create(Job::new("announce", |_| {
        info!("both squares are ready");
        Ok(Value::Null)
    }))?;
    scheduler.add_dependents(left, &[announce])?;
    scheduler.add_dependents(right, &[announce])?;

    scheduler.submit(&[left, right, announce])?;

    sleep(Duration::from_millis(50));
    println!("{}", serde_json::to_string_pretty(&scheduler.task_list())?);

    scheduler.shutdown();

    let total = [left, right]
        .iter()
        .filter_map(|id| scheduler.result(*id).ok().flatten())
        .filter_map(|value| value.as_i64())
        .sum::<i64>();
    println!("3² + 4² = {}", total);
    Ok(())
}
