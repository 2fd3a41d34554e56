// SPDX-License-Identifier: MIT
//
// A failing job leaves its dependents pending forever; the rest of the graph still runs.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use anyhow::bail;
use jobgraph::job_engine::{Job, Scheduler};
use serde_json::Value;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let scheduler = Scheduler::with_default_workers()?;

    let mount = scheduler.create(Job::new("mount share", |_| bail!("host unreachable")))?;
    let copy = scheduler
        .create(Job::new("copy files", |_| Ok(Value::Null)).add_dependencies(&[mount]))?;
    let report = scheduler.create(Job::new("write report", |_| Ok(Value::Null)))?;

    scheduler.submit(&[mount, copy, report])?;
    scheduler.shutdown();

    for id in [mount, copy, report] {
        println!(
            "{:<14} {:?} {}",
            scheduler.name(id)?,
            scheduler.state(id)?,
            scheduler
                .failure(id)?
                .map(|failure| failure.to_string())
                .unwrap_or_default()
        );
    }
    for id in scheduler.stalled() {
        println!("{} never ran", scheduler.name(id)?);
    }
    Ok(())
}
