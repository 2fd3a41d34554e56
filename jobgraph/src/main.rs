// SPDX-License-Identifier: MIT
// jobgraph: run a JSON job plan on a dependency-aware thread pool
//
// - Jobs run as soon as everything they run after has completed.
// - A failed job stops its dependents; the rest of the plan still runs.
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::path::PathBuf;

use clap::Parser;
use log::info;

use jobgraph::global_config::{self, ReportFormat, DEFAULT_SHELL};
use jobgraph::job_engine::SchedulerConfig;
use jobgraph::plan::{run_plan, Plan, PlanReport};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the JSON job plan
    plan: PathBuf,

    /// Number of worker threads (defaults to the available parallelism)
    #[arg(long, short)]
    workers: Option<usize>,

    /// Shell used for `shell` actions
    #[arg(long, default_value = DEFAULT_SHELL)]
    shell: String,

    /// Log each shell command before running it
    #[arg(long)]
    echo: bool,

    /// How to print the outcome
    #[arg(long, value_enum, default_value_t)]
    report: ReportFormat,

    /// Log scheduling decisions
    #[arg(long, short)]
    verbose: bool,
}

fn validate_args(args: &Args) -> Result<(), String> {
    if args.workers == Some(0) {
        return Err("--workers must be at least 1".into());
    }
    if args.shell.is_empty() {
        return Err("--shell must not be empty".into());
    }
    Ok(())
}

fn print_summary(report: &PlanReport) {
    for job in &report.jobs {
        match &job.failure {
            Some(failure) => println!("{}: {:?} ({})", job.name, job.state, failure),
            None => println!("{}: {:?}", job.name, job.state),
        }
    }
    for pending in &report.task_list.pending {
        println!(
            "{}: never ran, waiting for {}",
            pending.name,
            pending.pending.join(", ")
        );
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Err(e) = validate_args(&args) {
        eprintln!("Error: {e}");
        std::process::exit(2);
    }

    global_config::initialize_global_config(&args.shell, args.echo);

    let plan = Plan::load(&args.plan)?;
    info!("Loaded {} jobs from {}", plan.jobs.len(), args.plan.display());

    let report = run_plan(
        &plan,
        SchedulerConfig {
            workers: args.workers,
            ..SchedulerConfig::default()
        },
    )?;

    match args.report {
        ReportFormat::Summary => print_summary(&report),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}
