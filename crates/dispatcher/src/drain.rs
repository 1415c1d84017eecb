//! Drain tracking - in-flight counter plus a drained signal
//!
//! The signal is a `watch` channel whose value is recomputed from the counter
//! while holding the channel's lock, so the last writer always publishes the
//! counter's latest value.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{BatchId, ErrorHandler};
use tokio::sync::watch;
use tracing::{trace, warn};

use crate::error::DispatcherError;

/// Counts batches submitted but not yet fully processed
#[derive(Debug)]
pub struct DrainTracker {
    in_flight: AtomicUsize,
    drained: watch::Sender<bool>,
}

impl DrainTracker {
    pub fn new() -> Self {
        let (drained, _) = watch::channel(true);
        Self {
            in_flight: AtomicUsize::new(0),
            drained,
        }
    }

    /// Batches currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the drained signal is set
    pub fn is_drained(&self) -> bool {
        *self.drained.borrow()
    }

    /// Count a new batch; the returned guard releases it exactly once
    pub fn begin(self: &Arc<Self>) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.refresh();
        InFlightGuard {
            tracker: Arc::clone(self),
            completed: false,
            abandon: None,
        }
    }

    /// Wait until drained or `timeout` elapses; true if drained
    #[allow(clippy::let_and_return)]
    pub async fn wait(&self, timeout: Duration) -> bool {
        let mut rx = self.drained.subscribe();
        // Bound first so the `watch::Ref` temporary is gone before `rx`
        let drained = tokio::time::timeout(timeout, rx.wait_for(|drained| *drained))
            .await
            .is_ok_and(|waited| waited.is_ok());
        drained
    }

    fn end(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(previous > 0, "in-flight counter underflow");
        self.refresh();
    }

    fn refresh(&self) {
        self.drained.send_if_modified(|drained| {
            let now = self.in_flight.load(Ordering::SeqCst) == 0;
            if *drained == now {
                return false;
            }
            *drained = now;
            true
        });
    }
}

impl Default for DrainTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds one in-flight slot; released on drop
pub struct InFlightGuard {
    tracker: Arc<DrainTracker>,
    completed: bool,
    abandon: Option<AbandonReport>,
}

struct AbandonReport {
    batch_id: BatchId,
    size: usize,
    handler: Arc<dyn ErrorHandler>,
    silenced: Arc<AtomicBool>,
}

/// Turns off an armed guard's abandon report
#[derive(Debug, Clone)]
pub struct Silencer(Arc<AtomicBool>);

impl Silencer {
    pub fn silence(&self) {
        self.0.store(true, Ordering::Release);
    }
}

impl InFlightGuard {
    /// Report batch `batch_id` through `handler` if the slot is released
    /// without `complete`, unless the returned `Silencer` fired first
    pub fn report_abandoned(
        &mut self,
        batch_id: BatchId,
        size: usize,
        handler: Arc<dyn ErrorHandler>,
    ) -> Silencer {
        let silenced = Arc::new(AtomicBool::new(false));
        self.abandon = Some(AbandonReport {
            batch_id,
            size,
            handler,
            silenced: Arc::clone(&silenced),
        });
        Silencer(silenced)
    }

    /// Release after the batch ran to completion
    pub fn complete(mut self) {
        self.completed = true;
    }
}

impl fmt::Debug for InFlightGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightGuard")
            .field("completed", &self.completed)
            .field("batch_id", &self.abandon.as_ref().map(|a| a.batch_id))
            .finish_non_exhaustive()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.completed {
            match self.abandon.take() {
                Some(report) if !report.silenced.load(Ordering::Acquire) => {
                    let err = DispatcherError::Abandoned {
                        batch_id: report.batch_id,
                        size: report.size,
                    };
                    warn!(batch_id = %report.batch_id, "Batch dropped before it ran");
                    report.handler.error(&err.to_string(), Some(&err));
                }
                _ => trace!("in-flight slot released without completion"),
            }
        }
        self.tracker.end();
    }
}
