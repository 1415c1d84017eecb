//! BatchPublisher - publishes one batch against an open session
//!
//! Fail-fast per batch: the first event that cannot be encoded, published or
//! published in time aborts the rest of its batch. Failures become reports;
//! `send` always returns.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    Batch, BatchId, BrokerSession, ConnectionState, Destination, ErrorHandler, LogEvent,
    MessageFormat, PublishConfig,
};
use tracing::{debug, instrument};

use crate::codec;
use crate::error::DispatcherError;
use crate::report::TracingErrorHandler;

/// Default per-message send timeout
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// What happened to a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Every event published
    Delivered { published: usize },
    /// Connection not started; nothing published
    Dropped,
    /// A send failed after `published` events went out
    Aborted { published: usize },
}

impl BatchOutcome {
    /// Events that reached the broker
    pub fn published(&self) -> usize {
        match self {
            Self::Delivered { published } | Self::Aborted { published } => *published,
            Self::Dropped => 0,
        }
    }

    /// Metric label
    pub fn status(&self) -> &'static str {
        match self {
            Self::Delivered { .. } => "delivered",
            Self::Dropped => "dropped",
            Self::Aborted { .. } => "aborted",
        }
    }
}

/// Publishes batches to `<topic_prefix>.<source>` destinations
pub struct BatchPublisher<S> {
    session: Arc<S>,
    topic_prefix: String,
    format: MessageFormat,
    send_timeout: Duration,
    error_handler: Arc<dyn ErrorHandler>,
}

impl<S> BatchPublisher<S>
where
    S: BrokerSession + Sync + 'static,
{
    /// JSON encoding, 500ms send timeout, reports logged through tracing
    pub fn new(session: Arc<S>, topic_prefix: impl Into<String>) -> Self {
        Self {
            session,
            topic_prefix: topic_prefix.into(),
            format: MessageFormat::default(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            error_handler: Arc::new(TracingErrorHandler),
        }
    }

    /// Build from the `[publish]` config section
    pub fn from_config(session: Arc<S>, config: &PublishConfig) -> Self {
        Self::new(session, config.topic_prefix.clone())
            .with_format(config.format)
            .with_send_timeout(config.send_timeout())
    }

    pub fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    pub fn topic_prefix(&self) -> &str {
        &self.topic_prefix
    }

    pub fn error_handler(&self) -> &Arc<dyn ErrorHandler> {
        &self.error_handler
    }

    /// Publish every event of `batch` in order
    #[instrument(
        name = "batch_publisher_send",
        skip(self, batch),
        fields(batch_id = %batch_id, size = batch.len())
    )]
    pub async fn send(&self, batch_id: BatchId, batch: &Batch) -> BatchOutcome {
        let state = self.session.state();
        if state != ConnectionState::Started {
            self.report(&DispatcherError::ConnectionUnavailable {
                batch_id,
                size: batch.len(),
                state,
            });
            return BatchOutcome::Dropped;
        }

        for (index, event) in batch.iter().enumerate() {
            if let Err(err) = self.publish_event(batch_id, index, batch.len(), event).await {
                self.report(&err);
                return BatchOutcome::Aborted { published: index };
            }
        }

        debug!(batch_id = %batch_id, events = batch.len(), "Batch published");
        BatchOutcome::Delivered {
            published: batch.len(),
        }
    }

    async fn publish_event(
        &self,
        batch_id: BatchId,
        index: usize,
        size: usize,
        event: &LogEvent,
    ) -> Result<(), DispatcherError> {
        let destination = Destination::derive(&self.topic_prefix, &event.source);
        let message = codec::encode(self.format, event).map_err(|source| {
            DispatcherError::Encode {
                batch_id,
                index,
                size,
                source,
            }
        })?;

        match tokio::time::timeout(
            self.send_timeout,
            self.session.publish(&destination, message),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(DispatcherError::PublishFailure {
                batch_id,
                index,
                size,
                destination: destination.to_string(),
                source,
            }),
            Err(_) => Err(DispatcherError::PublishTimeout {
                batch_id,
                index,
                size,
                destination: destination.to_string(),
                timeout_ms: self.send_timeout.as_millis() as u64,
            }),
        }
    }

    fn report(&self, err: &DispatcherError) {
        self.error_handler.error(&err.to_string(), Some(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker::{MockConfig, MockSession};
    use contracts::Level;
    use std::sync::Mutex;

    /// Collects reports for assertions
    #[derive(Default)]
    struct RecordingHandler {
        messages: Mutex<Vec<String>>,
    }

    impl ErrorHandler for RecordingHandler {
        fn error(&self, message: &str, _cause: Option<&(dyn std::error::Error + 'static)>) {
            self.messages.lock().unwrap().push(message.to_string());
        }
    }

    impl RecordingHandler {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    fn batch_of(sources: &[&str]) -> Batch {
        sources
            .iter()
            .map(|s| LogEvent::new(*s, Level::Info, "hello"))
            .collect()
    }

    fn publisher(session: &Arc<MockSession>, handler: &Arc<RecordingHandler>) -> BatchPublisher<MockSession> {
        BatchPublisher::new(Arc::clone(session), "LOG4NET")
            .with_error_handler(Arc::clone(handler) as Arc<dyn ErrorHandler>)
    }

    #[tokio::test]
    async fn test_publishes_in_order_to_derived_destinations() {
        let session = Arc::new(MockSession::new());
        let handler = Arc::new(RecordingHandler::default());
        let publisher = publisher(&session, &handler);

        let outcome = publisher
            .send(BatchId(1), &batch_of(&["A", "B", "MyLogger"]))
            .await;

        assert_eq!(outcome, BatchOutcome::Delivered { published: 3 });
        assert_eq!(
            session.published_destinations(),
            vec!["LOG4NET.A", "LOG4NET.B", "LOG4NET.MyLogger"]
        );
        assert!(handler.messages().is_empty());
    }

    #[tokio::test]
    async fn test_unstarted_session_drops_whole_batch() {
        let session = Arc::new(MockSession::new().with_state(ConnectionState::Unopened));
        let handler = Arc::new(RecordingHandler::default());
        let publisher = publisher(&session, &handler);

        let outcome = publisher.send(BatchId(4), &batch_of(&["A", "B"])).await;

        assert_eq!(outcome, BatchOutcome::Dropped);
        assert_eq!(session.publish_calls(), 0);
        let messages = handler.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("dropped"), "got: {}", messages[0]);
        assert!(messages[0].contains("unopened"), "got: {}", messages[0]);
    }

    #[tokio::test]
    async fn test_closed_session_drops_whole_batch() {
        let session = Arc::new(MockSession::new());
        session.set_state(ConnectionState::Closed);
        let handler = Arc::new(RecordingHandler::default());
        let publisher = publisher(&session, &handler);

        let outcome = publisher.send(BatchId(5), &batch_of(&["A"])).await;

        assert_eq!(outcome, BatchOutcome::Dropped);
        assert_eq!(session.publish_calls(), 0);
        assert_eq!(handler.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_third_failure_aborts_rest_of_batch() {
        let session = Arc::new(MockSession::with_config(MockConfig {
            fail_at: Some(3),
            ..Default::default()
        }));
        let handler = Arc::new(RecordingHandler::default());
        let publisher = publisher(&session, &handler);

        let outcome = publisher
            .send(BatchId(9), &batch_of(&["e1", "e2", "e3", "e4", "e5"]))
            .await;

        assert_eq!(outcome, BatchOutcome::Aborted { published: 2 });
        assert_eq!(session.published().len(), 2);
        assert_eq!(session.publish_calls(), 3);
        let messages = handler.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("batch #9"), "got: {}", messages[0]);
        assert!(messages[0].contains("LOG4NET.e3"), "got: {}", messages[0]);
    }

    #[tokio::test]
    async fn test_stalled_publish_times_out() {
        let session = Arc::new(MockSession::with_config(MockConfig {
            hang: true,
            ..Default::default()
        }));
        let handler = Arc::new(RecordingHandler::default());
        let publisher =
            publisher(&session, &handler).with_send_timeout(Duration::from_millis(20));

        let outcome = publisher.send(BatchId(2), &batch_of(&["A", "B"])).await;

        assert_eq!(outcome, BatchOutcome::Aborted { published: 0 });
        assert_eq!(session.publish_calls(), 1);
        let messages = handler.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("timed out"), "got: {}", messages[0]);
    }

    #[tokio::test]
    async fn test_from_config_uses_prefix_and_format() {
        let session = Arc::new(MockSession::new());
        let config = PublishConfig {
            topic_prefix: "TP2".into(),
            format: MessageFormat::Bincode,
            send_timeout_ms: 100,
        };
        let publisher = BatchPublisher::from_config(Arc::clone(&session), &config);
        assert_eq!(publisher.topic_prefix(), "TP2");

        publisher.send(BatchId(1), &batch_of(&["MyLogger"])).await;

        let published = session.published();
        assert_eq!(published[0].0.as_str(), "TP2.MyLogger");
        assert_eq!(published[0].1.content_type, "application/x-bincode");
        let event = codec::decode(&published[0].1).unwrap();
        assert_eq!(event.source, "MyLogger");
    }
}
