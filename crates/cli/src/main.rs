mod cli;
mod config;
mod workload;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fixpool_scheduler::Scheduler;
use tracing::info;

use crate::cli::CliArgs;
use crate::workload::WorkloadPlan;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    fixpool_core::load_dotenv();
    let args = CliArgs::parse();

    let config = config::resolve(&args)?;
    config.log_summary();

    let scheduler = Arc::new(Scheduler::with_config(config).context("failed to create scheduler")?);

    let plan = WorkloadPlan {
        tasks: args.tasks,
        min_sleep: Duration::from_millis(args.min_sleep_ms),
        max_sleep: Duration::from_millis(args.max_sleep_ms),
        fail_every: args.fail_every,
    };
    let result = workload::run(&scheduler, &plan);

    // Drain and reap workers even when the workload bailed out early.
    scheduler.join();
    let mut report = result?;
    report.metrics = scheduler.metrics();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        info!(
            tasks = report.tasks,
            succeeded = report.succeeded,
            failed = report.failed,
            off_worker = report.off_worker,
            elapsed_ms = report.elapsed_ms,
            max_concurrency = report.max_concurrency,
            abandoned = report.metrics.tasks_abandoned,
            workers_spawned = report.metrics.workers_spawned,
            workers_retired = report.metrics.workers_retired,
            avg_task_ms = report.metrics.avg_task_duration.as_secs_f64() * 1000.0,
            "fixpool run complete"
        );
    }

    anyhow::ensure!(
        report.off_worker == 0,
        "{} tasks ran outside an execution thread",
        report.off_worker
    );
    Ok(())
}
