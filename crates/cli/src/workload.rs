//! Synthetic workload: sleeping tasks with optional failure injection.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, ensure};
use fixpool_scheduler::{Scheduler, SchedulerMetrics, TaskError};
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct WorkloadPlan {
    pub tasks: usize,
    pub min_sleep: Duration,
    pub max_sleep: Duration,
    /// Every Nth task panics; 0 disables.
    pub fail_every: usize,
}

/// Outcome of one workload run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    pub tasks: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Tasks that found themselves outside an execution thread (should be 0).
    pub off_worker: usize,
    pub elapsed_ms: u128,
    pub max_concurrency: usize,
    pub metrics: SchedulerMetrics,
}

/// Submit every task, then wait for all handles.
pub fn run(scheduler: &Arc<Scheduler>, plan: &WorkloadPlan) -> Result<WorkloadReport> {
    ensure!(
        plan.min_sleep <= plan.max_sleep,
        "min sleep ({:?}) exceeds max sleep ({:?})",
        plan.min_sleep,
        plan.max_sleep
    );

    let started = Instant::now();
    let mut rng = rand::thread_rng();
    let min_ms = plan.min_sleep.as_millis() as u64;
    let max_ms = plan.max_sleep.as_millis() as u64;

    let mut handles = Vec::with_capacity(plan.tasks);
    for n in 1..=plan.tasks {
        let sleep = Duration::from_millis(rng.gen_range(min_ms..=max_ms));
        let fail = plan.fail_every > 0 && n % plan.fail_every == 0;
        let sched = Arc::clone(scheduler);
        handles.push(scheduler.submit(move || {
            let on_worker = sched.is_execution_thread();
            thread::sleep(sleep);
            if fail {
                panic!("injected failure in task {n}");
            }
            on_worker
        })?);
    }
    debug!(tasks = plan.tasks, "workload submitted");

    let (mut succeeded, mut failed, mut off_worker) = (0, 0, 0);
    for handle in handles {
        match handle.join() {
            Ok(true) => succeeded += 1,
            Ok(false) => {
                succeeded += 1;
                off_worker += 1;
            }
            Err(TaskError::Failed(msg)) => {
                debug!(%msg, "task failed");
                failed += 1;
            }
            Err(e) => {
                warn!(error = %e, "task did not run");
                failed += 1;
            }
        }
    }

    let report = WorkloadReport {
        tasks: plan.tasks,
        succeeded,
        failed,
        off_worker,
        elapsed_ms: started.elapsed().as_millis(),
        max_concurrency: scheduler.maximum_concurrency_level(),
        metrics: scheduler.metrics(),
    };
    info!(
        succeeded,
        failed,
        elapsed_ms = report.elapsed_ms,
        peak_workers = report.metrics.peak_workers,
        "workload finished"
    );
    Ok(report)
}
