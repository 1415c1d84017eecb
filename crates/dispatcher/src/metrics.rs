//! Dispatch metrics for observability
//!
//! Local atomics back `snapshot()`; every update is mirrored to the global
//! `metrics` recorder through `observability`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::publisher::BatchOutcome;

/// Counters for one dispatcher
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    /// Non-empty batches accepted by `submit`
    submitted: AtomicU64,
    /// Batches whose worker ran to completion (any outcome)
    completed: AtomicU64,
    /// Batches the executor refused
    scheduling_failures: AtomicU64,
    /// Batches dropped because the connection was not started
    dropped: AtomicU64,
    /// Batches aborted part-way by a send failure
    failed: AtomicU64,
    /// Events published successfully
    events_published: AtomicU64,
}

impl DispatchMetrics {
    /// Create new metrics instance
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn scheduling_failures(&self) -> u64 {
        self.scheduling_failures.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }

    pub(crate) fn record_submitted(&self, events: usize) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        observability::record_batch_submitted(events);
    }

    pub(crate) fn record_scheduling_failure(&self) {
        self.scheduling_failures.fetch_add(1, Ordering::Relaxed);
        observability::record_scheduling_failure();
    }

    pub(crate) fn record_outcome(&self, outcome: BatchOutcome) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        let published = outcome.published() as u64;
        self.events_published.fetch_add(published, Ordering::Relaxed);
        match outcome {
            BatchOutcome::Delivered { .. } => {}
            BatchOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            BatchOutcome::Aborted { .. } => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        observability::record_batch_completed(outcome.status(), outcome.published());
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted(),
            completed: self.completed(),
            scheduling_failures: self.scheduling_failures(),
            dropped: self.dropped(),
            failed: self.failed(),
            events_published: self.events_published(),
        }
    }
}

/// Snapshot of dispatch metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub completed: u64,
    pub scheduling_failures: u64,
    pub dropped: u64,
    pub failed: u64,
    pub events_published: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcomes_are_classified() {
        let metrics = DispatchMetrics::new();
        metrics.record_submitted(3);
        metrics.record_submitted(5);
        metrics.record_submitted(2);
        metrics.record_outcome(BatchOutcome::Delivered { published: 3 });
        metrics.record_outcome(BatchOutcome::Aborted { published: 2 });
        metrics.record_outcome(BatchOutcome::Dropped);

        let snap = metrics.snapshot();
        assert_eq!(snap.submitted, 3);
        assert_eq!(snap.completed, 3);
        assert_eq!(snap.events_published, 5);
        assert_eq!(snap.failed, 1);
        assert_eq!(snap.dropped, 1);
    }
}
