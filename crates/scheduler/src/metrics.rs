use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Scheduler operational metrics. Observational only; never used for scheduling.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    /// Items accepted by `submit`.
    pub tasks_submitted: u64,
    /// Items whose body returned normally.
    pub tasks_completed: u64,
    /// Items whose body panicked.
    pub tasks_failed: u64,
    /// Items skipped because they were cancelled before starting.
    pub tasks_cancelled: u64,
    /// Items dropped unrun because no worker was left to claim them.
    pub tasks_abandoned: u64,
    pub workers_spawned: u64,
    pub workers_retired: u64,
    /// Highest live-worker count observed.
    pub peak_workers: usize,
    /// Mean body duration over completed and failed items.
    pub avg_task_duration: Duration,
    /// When the most recent item finished.
    pub last_completed: Option<DateTime<Utc>>,
}

impl SchedulerMetrics {
    pub fn record_submitted(&mut self) {
        self.tasks_submitted += 1;
    }

    /// Record a finished body.
    pub fn record_execution(&mut self, duration: Duration, failed: bool) {
        if failed {
            self.tasks_failed += 1;
        } else {
            self.tasks_completed += 1;
        }
        self.last_completed = Some(Utc::now());

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = self.tasks_completed + self.tasks_failed;
        self.avg_task_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = self.avg_task_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub fn record_cancelled(&mut self) {
        self.tasks_cancelled += 1;
    }

    pub fn record_abandoned(&mut self) {
        self.tasks_abandoned += 1;
    }

    pub fn record_worker_spawned(&mut self, live_workers: usize) {
        self.workers_spawned += 1;
        self.peak_workers = self.peak_workers.max(live_workers);
    }

    pub fn record_worker_retired(&mut self) {
        self.workers_retired += 1;
    }

    /// Items accepted but not yet finished, skipped, or abandoned.
    pub fn tasks_outstanding(&self) -> u64 {
        self.tasks_submitted.saturating_sub(
            self.tasks_completed + self.tasks_failed + self.tasks_cancelled + self.tasks_abandoned,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_single_execution() {
        let mut m = SchedulerMetrics::default();
        m.record_submitted();
        m.record_execution(Duration::from_millis(100), false);

        assert_eq!(m.tasks_completed, 1);
        assert_eq!(m.tasks_failed, 0);
        assert!(m.last_completed.is_some());
        assert_eq!(m.avg_task_duration, Duration::from_millis(100));
        assert_eq!(m.tasks_outstanding(), 0);
    }

    #[test]
    fn record_multiple_executions_averages() {
        let mut m = SchedulerMetrics::default();
        m.record_execution(Duration::from_millis(100), false);
        m.record_execution(Duration::from_millis(200), true);

        assert_eq!(m.tasks_completed, 1);
        assert_eq!(m.tasks_failed, 1);
        // Average of 100ms and 200ms = 150ms
        let avg = m.avg_task_duration.as_millis();
        assert!((140..=160).contains(&avg), "expected ~150ms, got {}ms", avg);
    }

    #[test]
    fn peak_workers_is_high_water_mark() {
        let mut m = SchedulerMetrics::default();
        m.record_worker_spawned(1);
        m.record_worker_spawned(3);
        m.record_worker_retired();
        m.record_worker_spawned(2);

        assert_eq!(m.workers_spawned, 3);
        assert_eq!(m.workers_retired, 1);
        assert_eq!(m.peak_workers, 3);
    }

    #[test]
    fn outstanding_counts_unfinished_items() {
        let mut m = SchedulerMetrics::default();
        for _ in 0..4 {
            m.record_submitted();
        }
        m.record_cancelled();
        m.record_execution(Duration::from_millis(1), false);
        assert_eq!(m.tasks_outstanding(), 2);

        m.record_abandoned();
        assert_eq!(m.tasks_abandoned, 1);
        assert_eq!(m.tasks_outstanding(), 1);
    }

    #[test]
    fn snapshot_serializes_abandoned_count() {
        let mut m = SchedulerMetrics::default();
        m.record_abandoned();
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["tasks_abandoned"], 1);
    }

    #[test]
    fn default_metrics() {
        let m = SchedulerMetrics::default();
        assert_eq!(m.tasks_submitted, 0);
        assert_eq!(m.peak_workers, 0);
        assert!(m.last_completed.is_none());
    }
}
