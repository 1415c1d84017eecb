//! Dispatcher error types
//!
//! None of these escape `submit` or a worker; they are handed to the
//! `ErrorHandler` as reports.

use thiserror::Error;

use contracts::{BatchId, ConnectionState, ContractError};

/// Why an executor refused a job
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Worker limit reached
    #[error("worker pool saturated ({limit} batches in flight)")]
    Saturated { limit: usize },

    /// Executor no longer accepts work
    #[error("executor is closed")]
    Closed,

    /// No async runtime to spawn onto
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Dispatcher-specific errors
#[derive(Debug, Error)]
pub enum DispatcherError {
    /// Executor refused the batch; in-flight count rolled back
    #[error("failed to schedule batch {batch_id} ({size} events): {source}")]
    SchedulingFailure {
        batch_id: BatchId,
        size: usize,
        #[source]
        source: SpawnError,
    },

    /// Session missing or not started; whole batch dropped
    #[error("batch {batch_id} ({size} events) dropped: connection is {state}")]
    ConnectionUnavailable {
        batch_id: BatchId,
        size: usize,
        state: ConnectionState,
    },

    /// Event could not be encoded; rest of the batch aborted
    #[error("batch {batch_id} aborted at event {index}/{size}: {source}")]
    Encode {
        batch_id: BatchId,
        index: usize,
        size: usize,
        #[source]
        source: ContractError,
    },

    /// Publish returned an error; rest of the batch aborted
    #[error("batch {batch_id} aborted at event {index}/{size} ({destination}): {source}")]
    PublishFailure {
        batch_id: BatchId,
        index: usize,
        size: usize,
        destination: String,
        #[source]
        source: ContractError,
    },

    /// Publish exceeded the send timeout; rest of the batch aborted
    #[error("batch {batch_id} aborted at event {index}/{size} ({destination}): send timed out after {timeout_ms}ms")]
    PublishTimeout {
        batch_id: BatchId,
        index: usize,
        size: usize,
        destination: String,
        timeout_ms: u64,
    },

    /// Accepted job dropped before it ran (queue discarded, runtime shutting down)
    #[error("batch {batch_id} ({size} events) dropped before it ran")]
    Abandoned { batch_id: BatchId, size: usize },

    /// Shutdown wait exceeded its bound
    #[error("{in_flight} batches still in flight after {timeout_ms}ms drain wait")]
    DrainTimeout { in_flight: usize, timeout_ms: u64 },
}

impl DispatcherError {
    /// Batch the error refers to, if any
    pub fn batch_id(&self) -> Option<BatchId> {
        match self {
            Self::SchedulingFailure { batch_id, .. }
            | Self::ConnectionUnavailable { batch_id, .. }
            | Self::Abandoned { batch_id, .. }
            | Self::Encode { batch_id, .. }
            | Self::PublishFailure { batch_id, .. }
            | Self::PublishTimeout { batch_id, .. } => Some(*batch_id),
            Self::DrainTimeout { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_failure_message_references_batch() {
        let err = DispatcherError::PublishFailure {
            batch_id: BatchId(7),
            index: 2,
            size: 5,
            destination: "LOG4NET.MyLogger".into(),
            source: ContractError::publish("LOG4NET.MyLogger", "broken pipe"),
        };
        let msg = err.to_string();
        assert!(msg.contains("batch #7"), "got: {msg}");
        assert!(msg.contains("2/5"), "got: {msg}");
        assert_eq!(err.batch_id(), Some(BatchId(7)));
    }

    #[test]
    fn test_drain_timeout_has_no_batch() {
        let err = DispatcherError::DrainTimeout {
            in_flight: 3,
            timeout_ms: 100,
        };
        assert_eq!(err.batch_id(), None);
        assert!(err.to_string().contains("3 batches"));
    }
}
