//! Aggregate scheduler metrics

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use gatekeep_db::{QueueStats, QueueStatus};

use crate::review::EngineStatus;

/// Running counters kept by the scheduler
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerMetrics {
    pub cycles: u64,
    pub items_processed: u64,
    pub item_errors: u64,
    /// Final status of each processed item, counted by status name
    pub outcomes: BTreeMap<String, u64>,
    /// Submission-to-decision latency, running average
    pub avg_review_latency_secs: f64,
    pub avg_cycle_duration_ms: f64,
    pub last_cycle_duration_ms: u64,
    /// Training notes dispatched, per agent
    pub training_feedback: BTreeMap<String, u64>,
    /// Queue counters as of the last cycle
    pub queue: QueueStats,
    /// approved / total
    pub approval_rate: f64,
    /// rejected / total
    pub rejection_rate: f64,
    pub engine: EngineStatus,
    #[serde(skip)]
    latency_samples: u64,
}

impl SchedulerMetrics {
    pub fn record_outcome(&mut self, status: QueueStatus, latency: Duration) {
        self.items_processed += 1;
        *self.outcomes.entry(status.to_string()).or_default() += 1;
        if status == QueueStatus::Error {
            self.item_errors += 1;
        }

        self.latency_samples += 1;
        self.avg_review_latency_secs = running_average(
            self.avg_review_latency_secs,
            latency.as_secs_f64(),
            self.latency_samples,
        );
    }

    pub fn record_cycle(&mut self, duration: Duration) {
        self.cycles += 1;
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.last_cycle_duration_ms = ms;
        self.avg_cycle_duration_ms = running_average(self.avg_cycle_duration_ms, ms as f64, self.cycles);
    }

    pub fn record_training(&mut self, agent: &str) {
        *self.training_feedback.entry(agent.to_string()).or_default() += 1;
    }

    pub fn update_queue(&mut self, stats: QueueStats) {
        let total = stats.total.max(0) as f64;
        let share = |n: i64| if total > 0.0 { n as f64 / total } else { 0.0 };
        self.approval_rate = share(stats.approved);
        self.rejection_rate = share(stats.rejected);
        self.queue = stats;
    }

    pub fn update_engine(&mut self, status: &EngineStatus) {
        self.engine = status.clone();
    }
}

fn running_average(current: f64, sample: f64, count: u64) -> f64 {
    if count == 0 {
        return 0.0;
    }
    current + (sample - current) / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_and_latency() {
        let mut metrics = SchedulerMetrics::default();
        metrics.record_outcome(QueueStatus::Merged, Duration::from_secs(2));
        metrics.record_outcome(QueueStatus::Error, Duration::from_secs(4));
        metrics.record_outcome(QueueStatus::Merged, Duration::from_secs(6));

        assert_eq!(metrics.items_processed, 3);
        assert_eq!(metrics.item_errors, 1);
        assert_eq!(metrics.outcomes.get("merged"), Some(&2));
        assert!((metrics.avg_review_latency_secs - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_cycle_durations() {
        let mut metrics = SchedulerMetrics::default();
        metrics.record_cycle(Duration::from_millis(100));
        metrics.record_cycle(Duration::from_millis(300));
        assert_eq!(metrics.cycles, 2);
        assert_eq!(metrics.last_cycle_duration_ms, 300);
        assert!((metrics.avg_cycle_duration_ms - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_queue_rates() {
        let mut metrics = SchedulerMetrics::default();
        metrics.update_queue(QueueStats::from_counts(&[
            (QueueStatus::Approved, 2),
            (QueueStatus::Rejected, 1),
            (QueueStatus::Pending, 1),
        ]));
        assert!((metrics.approval_rate - 0.5).abs() < 1e-9);
        assert!((metrics.rejection_rate - 0.25).abs() < 1e-9);

        metrics.update_queue(QueueStats::default());
        assert_eq!(metrics.approval_rate, 0.0);
        assert_eq!(metrics.rejection_rate, 0.0);
    }

    #[test]
    fn test_training_counts() {
        let mut metrics = SchedulerMetrics::default();
        metrics.record_training("go_agent");
        metrics.record_training("go_agent");
        assert_eq!(metrics.training_feedback.get("go_agent"), Some(&2));
    }
}
