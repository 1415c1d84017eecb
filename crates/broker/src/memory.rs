//! In-process broker
//!
//! Topic semantics only: every subscription whose pattern matches a published
//! destination receives its own copy. Patterns follow the ActiveMQ wildcard
//! rules (`.` separates segments, `*` matches one segment, `>` matches one or
//! more trailing segments).

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use contracts::{
    BrokerConnection, BrokerSession, BrokerTransport, ConnectionState, ContractError,
    Destination, Endpoint, SharedState, TransportMessage,
};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};

/// A message as seen by a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub destination: Destination,
    pub message: TransportMessage,
}

/// Parsed subscription pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationPattern {
    segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    AnyOne,
    AnyRest,
}

impl DestinationPattern {
    /// Parse a pattern; `>` is only valid as the last segment
    pub fn parse(pattern: &str) -> Result<Self, ContractError> {
        let raw: Vec<&str> = pattern.split('.').collect();
        let mut segments = Vec::with_capacity(raw.len());
        for (i, part) in raw.iter().enumerate() {
            let segment = match *part {
                "" => {
                    return Err(ContractError::Other(format!(
                        "empty segment in pattern '{pattern}'"
                    )))
                }
                "*" => Segment::AnyOne,
                ">" if i + 1 == raw.len() => Segment::AnyRest,
                ">" => {
                    return Err(ContractError::Other(format!(
                        "'>' must be the last segment in '{pattern}'"
                    )))
                }
                literal => Segment::Literal(literal.to_string()),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    pub fn matches(&self, destination: &str) -> bool {
        let parts: Vec<&str> = destination.split('.').collect();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::AnyRest => return parts.len() > i,
                Segment::AnyOne => {
                    if i >= parts.len() {
                        return false;
                    }
                }
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return false;
                    }
                }
            }
        }
        parts.len() == self.segments.len()
    }
}

/// Receiving end of a subscription
pub struct Subscription {
    pattern: DestinationPattern,
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl Subscription {
    pub fn pattern(&self) -> &DestinationPattern {
        &self.pattern
    }

    /// Next delivery; `None` once the broker is gone
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }

    /// Next delivery or `None` after `timeout`
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Option<Delivery> {
        tokio::time::timeout(timeout, self.rx.recv())
            .await
            .ok()
            .flatten()
    }

    /// Everything already delivered, without waiting
    pub fn drain(&mut self) -> Vec<Delivery> {
        let mut out = Vec::new();
        while let Ok(delivery) = self.rx.try_recv() {
            out.push(delivery);
        }
        out
    }
}

struct Subscriber {
    pattern: DestinationPattern,
    tx: mpsc::UnboundedSender<Delivery>,
}

#[derive(Default)]
struct BrokerInner {
    subscribers: Mutex<Vec<Subscriber>>,
    rejected: Mutex<Vec<DestinationPattern>>,
    refuse_connections: Mutex<bool>,
    published: AtomicU64,
    connections: AtomicUsize,
}

impl BrokerInner {
    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn rejected(&self) -> MutexGuard<'_, Vec<DestinationPattern>> {
        self.rejected.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refuses_connections(&self) -> bool {
        *self
            .refuse_connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Shared in-process broker; clones refer to the same broker
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to every destination matching `pattern`
    pub fn subscribe(&self, pattern: &str) -> Result<Subscription, ContractError> {
        let pattern = DestinationPattern::parse(pattern)?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.subscribers().push(Subscriber {
            pattern: pattern.clone(),
            tx,
        });
        Ok(Subscription { pattern, rx })
    }

    /// Make publishes to destinations matching `pattern` fail
    pub fn reject(&self, pattern: &str) -> Result<(), ContractError> {
        let pattern = DestinationPattern::parse(pattern)?;
        self.inner.rejected().push(pattern);
        Ok(())
    }

    /// Refuse (or accept again) new connections
    pub fn set_refuse_connections(&self, refuse: bool) {
        *self
            .inner
            .refuse_connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = refuse;
    }

    /// Messages accepted since creation
    pub fn published_count(&self) -> u64 {
        self.inner.published.load(Ordering::Relaxed)
    }

    /// Connections opened since creation
    pub fn connection_count(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }

    fn deliver(&self, destination: &Destination, message: TransportMessage) -> Result<(), ContractError> {
        if self
            .inner
            .rejected()
            .iter()
            .any(|p| p.matches(destination.as_str()))
        {
            return Err(ContractError::publish(
                destination.as_str(),
                "destination rejected by broker",
            ));
        }

        let mut subscribers = self.inner.subscribers();
        // Forget subscribers whose receiver is gone
        subscribers.retain(|s| !s.tx.is_closed());
        let mut receivers = 0usize;
        for subscriber in subscribers.iter() {
            if subscriber.pattern.matches(destination.as_str()) {
                let delivery = Delivery {
                    destination: destination.clone(),
                    message: message.clone(),
                };
                if subscriber.tx.send(delivery).is_ok() {
                    receivers += 1;
                }
            }
        }
        drop(subscribers);

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        trace!(destination = %destination, receivers, "Message delivered");
        Ok(())
    }
}

impl BrokerTransport for InMemoryBroker {
    type Connection = InMemoryConnection;

    #[instrument(name = "in_memory_connect", skip(self), fields(endpoint = %endpoint))]
    async fn connect(
        &self,
        endpoint: &Endpoint,
        client_id: &str,
    ) -> Result<InMemoryConnection, ContractError> {
        if self.inner.refuses_connections() {
            return Err(ContractError::connection(
                endpoint.to_string(),
                "broker refused connection",
            ));
        }
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
        let state = SharedState::default();
        debug!(client_id, "In-memory connection opened");
        Ok(InMemoryConnection {
            client_id: client_id.to_string(),
            session: Arc::new(InMemorySession {
                broker: self.clone(),
                state: state.clone(),
            }),
            state,
        })
    }
}

pub struct InMemoryConnection {
    client_id: String,
    state: SharedState,
    session: Arc<InMemorySession>,
}

impl BrokerConnection for InMemoryConnection {
    type Session = InMemorySession;

    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn start(&mut self) -> Result<(), ContractError> {
        match self.state.get() {
            ConnectionState::Closed => Err(ContractError::connection(
                "in-memory",
                "connection is closed",
            )),
            _ => {
                self.state.set(ConnectionState::Started);
                Ok(())
            }
        }
    }

    fn session(&self) -> Arc<InMemorySession> {
        Arc::clone(&self.session)
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        self.state.set(ConnectionState::Closed);
        Ok(())
    }
}

pub struct InMemorySession {
    broker: InMemoryBroker,
    state: SharedState,
}

impl BrokerSession for InMemorySession {
    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    async fn publish(
        &self,
        destination: &Destination,
        message: TransportMessage,
    ) -> Result<(), ContractError> {
        let state = self.state.get();
        if state != ConnectionState::Started {
            return Err(ContractError::NotStarted { state });
        }
        self.broker.deliver(destination, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(body: &'static str) -> TransportMessage {
        TransportMessage::new("application/json", body)
    }

    async fn started(broker: &InMemoryBroker) -> InMemoryConnection {
        let endpoint = Endpoint::parse("tcp://localhost:61613").unwrap();
        let mut conn = broker.connect(&endpoint, "test-client").await.unwrap();
        conn.start().await.unwrap();
        conn
    }

    #[test]
    fn test_pattern_matching() {
        let all = DestinationPattern::parse("LOG4NET.>").unwrap();
        assert!(all.matches("LOG4NET.A"));
        assert!(all.matches("LOG4NET.A.B"));
        assert!(!all.matches("LOG4NET"));
        assert!(!all.matches("OTHER.A"));

        let one = DestinationPattern::parse("LOG4NET.*").unwrap();
        assert!(one.matches("LOG4NET.A"));
        assert!(!one.matches("LOG4NET.A.B"));

        let mid = DestinationPattern::parse("*.Orders").unwrap();
        assert!(mid.matches("LOG4NET.Orders"));
        assert!(!mid.matches("LOG4NET.Users"));

        let exact = DestinationPattern::parse("LOG4NET.MyLogger").unwrap();
        assert!(exact.matches("LOG4NET.MyLogger"));
        assert!(!exact.matches("LOG4NET.MyLogger.Child"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(DestinationPattern::parse("a.>.b").is_err());
        assert!(DestinationPattern::parse("a..b").is_err());
    }

    #[tokio::test]
    async fn test_topic_fan_out() {
        let broker = InMemoryBroker::new();
        let mut all = broker.subscribe("LOG4NET.>").unwrap();
        let mut only_a = broker.subscribe("LOG4NET.A").unwrap();
        let conn = started(&broker).await;
        let session = conn.session();

        session.publish(&Destination::new("LOG4NET.A"), msg("1")).await.unwrap();
        session.publish(&Destination::new("LOG4NET.B"), msg("2")).await.unwrap();

        assert_eq!(all.drain().len(), 2);
        let a = only_a.drain();
        assert_eq!(a.len(), 1);
        assert_eq!(a[0].destination.as_str(), "LOG4NET.A");
        assert_eq!(broker.published_count(), 2);
    }

    #[tokio::test]
    async fn test_publish_requires_started() {
        let broker = InMemoryBroker::new();
        let endpoint = Endpoint::parse("tcp://localhost:61613").unwrap();
        let mut conn = broker.connect(&endpoint, "c").await.unwrap();
        let session = conn.session();

        let err = session.publish(&Destination::new("X.Y"), msg("1")).await.unwrap_err();
        assert!(matches!(err, ContractError::NotStarted { state: ConnectionState::Unopened }));

        conn.start().await.unwrap();
        session.publish(&Destination::new("X.Y"), msg("1")).await.unwrap();

        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(session.state(), ConnectionState::Closed);
        assert!(session.publish(&Destination::new("X.Y"), msg("1")).await.is_err());
        assert!(conn.start().await.is_err());
    }

    #[tokio::test]
    async fn test_rejected_destination() {
        let broker = InMemoryBroker::new();
        broker.reject("LOG4NET.Bad").unwrap();
        let mut sub = broker.subscribe("LOG4NET.>").unwrap();
        let conn = started(&broker).await;
        let session = conn.session();

        assert!(session.publish(&Destination::new("LOG4NET.Bad"), msg("x")).await.is_err());
        session.publish(&Destination::new("LOG4NET.Good"), msg("y")).await.unwrap();
        assert_eq!(sub.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let broker = InMemoryBroker::new();
        broker.set_refuse_connections(true);
        let endpoint = Endpoint::parse("tcp://localhost:61613").unwrap();
        assert!(broker.connect(&endpoint, "c").await.is_err());
        assert_eq!(broker.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_forgotten() {
        let broker = InMemoryBroker::new();
        let sub = broker.subscribe("LOG4NET.>").unwrap();
        drop(sub);
        let conn = started(&broker).await;
        conn.session()
            .publish(&Destination::new("LOG4NET.A"), msg("1"))
            .await
            .unwrap();
        assert!(broker.inner.subscribers().is_empty());
    }
}
