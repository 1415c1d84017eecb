//! BatchDispatcher - fire-and-forget hand-off of batches to background workers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{Batch, BatchId, BrokerSession, ErrorHandler};
use tracing::{debug, info, instrument, trace, warn};

use crate::drain::DrainTracker;
use crate::error::DispatcherError;
use crate::executor::Executor;
use crate::metrics::{DispatchMetrics, MetricsSnapshot};
use crate::publisher::BatchPublisher;

/// Schedules each submitted batch on the executor and tracks what is in flight
pub struct BatchDispatcher<S> {
    publisher: Arc<BatchPublisher<S>>,
    executor: Arc<dyn Executor>,
    tracker: Arc<DrainTracker>,
    metrics: Arc<DispatchMetrics>,
    error_handler: Arc<dyn ErrorHandler>,
    next_batch_id: AtomicU64,
}

impl<S> BatchDispatcher<S>
where
    S: BrokerSession + Sync + 'static,
{
    /// Reports go to the publisher's error handler
    pub fn new(publisher: BatchPublisher<S>, executor: Arc<dyn Executor>) -> Self {
        let error_handler = Arc::clone(publisher.error_handler());
        Self {
            publisher: Arc::new(publisher),
            executor,
            tracker: Arc::new(DrainTracker::new()),
            metrics: Arc::new(DispatchMetrics::new()),
            error_handler,
            next_batch_id: AtomicU64::new(1),
        }
    }

    /// Hand `batch` to a background worker without waiting for it
    ///
    /// Empty batches are ignored. Never blocks on I/O and never fails; a
    /// refused schedule is rolled back and reported.
    pub fn submit(&self, batch: Batch) {
        if batch.is_empty() {
            trace!("Ignoring empty batch");
            return;
        }

        let batch_id = BatchId(self.next_batch_id.fetch_add(1, Ordering::Relaxed));
        let size = batch.len();

        // Count before scheduling so a drain check never misses this batch
        let mut guard = self.tracker.begin();
        let silencer = guard.report_abandoned(batch_id, size, Arc::clone(&self.error_handler));
        self.metrics.record_submitted(size);
        observability::record_in_flight(self.tracker.in_flight());

        let publisher = Arc::clone(&self.publisher);
        let metrics = Arc::clone(&self.metrics);
        let tracker = Arc::clone(&self.tracker);
        let job = Box::pin(async move {
            let outcome = publisher.send(batch_id, &batch).await;
            metrics.record_outcome(outcome);
            guard.complete();
            observability::record_in_flight(tracker.in_flight());
        });

        match self.executor.execute(job) {
            Ok(()) => {
                debug!(batch_id = %batch_id, events = size, "Batch scheduled");
            }
            Err(rejected) => {
                // Reported below as a scheduling failure instead
                silencer.silence();
                let source = rejected.reason;
                drop(rejected.job);
                self.metrics.record_scheduling_failure();
                observability::record_in_flight(self.tracker.in_flight());
                let err = DispatcherError::SchedulingFailure {
                    batch_id,
                    size,
                    source,
                };
                self.error_handler.error(&err.to_string(), Some(&err));
            }
        }
    }

    /// Wait until nothing is in flight or `timeout` elapses; true if drained
    pub async fn await_drain(&self, timeout: Duration) -> bool {
        self.tracker.wait(timeout).await
    }

    /// Shutdown-path drain: warns and returns `DrainTimeout` if the wait expires
    #[instrument(name = "batch_dispatcher_drain", skip(self))]
    pub async fn drain(&self, timeout: Duration) -> Result<(), DispatcherError> {
        let started = std::time::Instant::now();
        let drained = self.await_drain(timeout).await;
        observability::record_drain(started.elapsed(), drained);

        if drained {
            info!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Dispatcher drained"
            );
            return Ok(());
        }

        let in_flight = self.in_flight();
        warn!(
            in_flight,
            timeout_ms = timeout.as_millis() as u64,
            "Drain timed out, proceeding with shutdown"
        );
        Err(DispatcherError::DrainTimeout {
            in_flight,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    /// Batches submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight()
    }

    /// Whether the drained signal is set
    pub fn is_drained(&self) -> bool {
        self.tracker.is_drained()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
