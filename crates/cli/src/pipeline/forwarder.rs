//! Forwarder - connects, batches input lines, dispatches and shuts down.
//!
//! Generic over the broker transport so the same lifecycle runs against STOMP
//! or the in-process broker.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use contracts::{
    Batch, BrokerConnection, BrokerTransport, Endpoint, ErrorHandler, ForwarderConfig, LogEvent,
};
use dispatcher::{BatchDispatcher, BatchPublisher, TokioExecutor};
use observability::ForwarderMetricsAggregator;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, info, instrument, warn};

use super::ForwardStats;
use crate::error::{CliError, Result};

/// One broker connection plus the dispatcher publishing over it
pub struct Forwarder<C: BrokerConnection> {
    connection: C,
    dispatcher: BatchDispatcher<C::Session>,
    executor: Arc<TokioExecutor>,
    buffer: Vec<LogEvent>,
    buffer_size: usize,
    drain_timeout: Duration,
    input: ForwarderMetricsAggregator,
    started_at: Instant,
}

impl<C: BrokerConnection> Forwarder<C> {
    /// Connect, start the connection and build the dispatcher
    #[instrument(name = "forwarder_connect", skip_all, fields(uri = %config.connection.uri))]
    pub async fn connect<T>(
        transport: &T,
        config: &ForwarderConfig,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Result<Self>
    where
        T: BrokerTransport<Connection = C>,
    {
        let uri = &config.connection.uri;
        let endpoint =
            Endpoint::parse(uri).map_err(|e| CliError::broker_connection(uri.as_str(), e))?;
        let client_id = client_id(&config.connection.client_id_prefix);

        info!(
            addresses = endpoint.addresses().len(),
            failover = endpoint.is_failover(),
            client_id = %client_id,
            "Connecting to broker..."
        );
        let mut connection = transport
            .connect(&endpoint, &client_id)
            .await
            .map_err(|e| CliError::broker_connection(uri.as_str(), e))?;
        connection
            .start()
            .await
            .map_err(|e| CliError::broker_connection(uri.as_str(), e))?;
        info!(state = %connection.state(), "Broker connection started");

        let executor = Arc::new(
            TokioExecutor::current()?.with_max_workers(config.dispatch.max_in_flight()),
        );
        let publisher = BatchPublisher::from_config(connection.session(), &config.publish)
            .with_error_handler(error_handler);
        let dispatcher = BatchDispatcher::new(publisher, executor.clone());

        Ok(Self {
            connection,
            dispatcher,
            executor,
            buffer: Vec::with_capacity(config.dispatch.buffer_size),
            buffer_size: config.dispatch.buffer_size.max(1),
            drain_timeout: config.dispatch.drain_timeout(),
            input: ForwarderMetricsAggregator::new(),
            started_at: Instant::now(),
        })
    }

    /// Client id announced to the broker
    pub fn client_id(&self) -> &str {
        self.connection.client_id()
    }

    /// Forward every line of `input` until EOF or `shutdown` resolves
    pub async fn run<R, F>(mut self, input: R, shutdown: F) -> Result<ForwardStats>
    where
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let mut lines = input.split(b'\n');
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                line = lines.next_segment() => match line {
                    Ok(Some(line)) => self.ingest_bytes(&line),
                    Ok(None) => {
                        info!("Input closed");
                        break;
                    }
                    Err(e) => {
                        error!(error = %e, "Input read failed, shutting down");
                        break;
                    }
                },
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping input...");
                    break;
                }
            }
        }

        self.shutdown().await
    }

    /// Lines that are not UTF-8 are counted and skipped like bad JSON
    fn ingest_bytes(&mut self, line: &[u8]) {
        match std::str::from_utf8(line) {
            Ok(line) => self.ingest_line(line),
            Err(e) => {
                warn!(error = %e, "Skipping input line that is not UTF-8");
                self.input.record_rejected();
            }
        }
    }

    /// Parse one JSON line; unparseable lines are counted and skipped
    fn ingest_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<LogEvent>(line) {
            Ok(event) => self.append(event),
            Err(e) => {
                warn!(error = %e, "Skipping unparseable input line");
                self.input.record_rejected();
            }
        }
    }

    /// Buffer one event, cutting a batch once `buffer_size` is reached
    pub fn append(&mut self, event: LogEvent) {
        self.input.record_event(&event);
        self.buffer.push(event);
        if self.buffer.len() >= self.buffer_size {
            self.flush();
        }
    }

    /// Submit whatever is buffered
    pub fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let events = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.buffer_size));
        self.input.record_batch(events.len());
        debug!(events = events.len(), "Submitting batch");
        self.dispatcher.submit(Batch::new(events));
    }

    /// Flush, drain, close; a drain timeout is logged and shutdown continues
    #[instrument(name = "forwarder_shutdown", skip(self), fields(client_id = %self.connection.client_id()))]
    pub async fn shutdown(mut self) -> Result<ForwardStats> {
        info!("Shutting down forwarder...");
        self.flush();

        let drained = self.dispatcher.drain(self.drain_timeout).await.is_ok();
        self.executor.close();
        let in_flight_at_close = self.dispatcher.in_flight();

        self.connection
            .close()
            .await
            .map_err(|e| CliError::shutdown(e.to_string()))?;

        let stats = ForwardStats {
            client_id: self.connection.client_id().to_string(),
            duration: self.started_at.elapsed(),
            drained,
            in_flight_at_close,
            input: self.input.summary(),
            dispatch: self.dispatcher.metrics(),
        };
        info!(
            batches = stats.dispatch.submitted,
            published = stats.dispatch.events_published,
            drained,
            "Forwarder shutdown complete"
        );
        Ok(stats)
    }
}

/// `<prefix>-<uuid>`, unique per process start
fn client_id(prefix: &str) -> String {
    format!("{prefix}-{}", uuid::Uuid::new_v4())
}
