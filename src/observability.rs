use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

use crate::dispatch::tracker::TaskOutcome;

/// Dispatch counters for one pool
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    pub submissions: AtomicU64,
    pub assignments: AtomicU64,
    pub contention_waits: AtomicU64,
    pub timeouts: AtomicU64,
    pub completions: AtomicU64,
    pub cancellations: AtomicU64,
    pub rejections: AtomicU64,
    pub steps: AtomicU64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_submission(&self) {
        self.submissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_assignment(&self) {
        self.assignments.fetch_add(1, Ordering::Relaxed);
    }

    /// A submitter found no agent available and had to wait
    pub fn record_contention_wait(&self) {
        self.contention_waits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_step(&self) {
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, outcome: TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Completed => &self.completions,
            TaskOutcome::Cancelled => &self.cancellations,
            TaskOutcome::Rejected => &self.rejections,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> DispatchStats {
        DispatchStats {
            submissions: self.submissions.load(Ordering::Relaxed),
            assignments: self.assignments.load(Ordering::Relaxed),
            contention_waits: self.contention_waits.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            cancellations: self.cancellations.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            steps: self.steps.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            submissions = stats.submissions,
            assignments = stats.assignments,
            contention_waits = stats.contention_waits,
            timeouts = stats.timeouts,
            completions = stats.completions,
            cancellations = stats.cancellations,
            rejections = stats.rejections,
            steps = stats.steps,
            "Dispatch metrics"
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub submissions: u64,
    pub assignments: u64,
    pub contention_waits: u64,
    pub timeouts: u64,
    pub completions: u64,
    pub cancellations: u64,
    pub rejections: u64,
    pub steps: u64,
}

/// Time an operation and log its duration when finished
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> u128 {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis() as u64,
            "Operation completed"
        );
        duration.as_millis()
    }
}
