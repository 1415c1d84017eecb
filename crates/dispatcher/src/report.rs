//! ErrorHandler implementations

use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use contracts::ErrorHandler;
use tracing::error;

/// Logs every report through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorHandler;

impl ErrorHandler for TracingErrorHandler {
    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        match cause {
            Some(cause) => error!(error = %cause, "{message}"),
            None => error!("{message}"),
        }
    }
}

/// Logs only the first report, counts the rest
///
/// Keeps a broker outage from flooding the application's own log.
#[derive(Debug, Default)]
pub struct OnlyOnceErrorHandler {
    reported: AtomicBool,
    count: AtomicU64,
}

impl OnlyOnceErrorHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total reports received, including suppressed ones
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Whether the first report has been logged
    pub fn has_reported(&self) -> bool {
        self.reported.load(Ordering::Acquire)
    }
}

impl ErrorHandler for OnlyOnceErrorHandler {
    fn error(&self, message: &str, cause: Option<&(dyn Error + 'static)>) {
        self.count.fetch_add(1, Ordering::Relaxed);
        if self
            .reported
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            TracingErrorHandler.error(message, cause);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_once_counts_everything() {
        let handler = OnlyOnceErrorHandler::new();
        assert!(!handler.has_reported());
        for _ in 0..3 {
            handler.error("broker down", None);
        }
        assert!(handler.has_reported());
        assert_eq!(handler.count(), 3);
    }
}
