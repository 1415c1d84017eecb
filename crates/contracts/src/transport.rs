//! Broker transport abstraction
//!
//! Three layers, mirroring how message-broker clients are usually shaped:
//! transport (connect) -> connection (lifecycle) -> session (publish).
//! The forwarder core only ever touches `BrokerSession`.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::{ContractError, Destination, Endpoint};

/// Connection lifecycle: Unopened -> Started -> Closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Started,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unopened => "unopened",
            Self::Started => "started",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Connection state shared between a connection and the sessions it hands out
#[derive(Debug, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new(state: ConnectionState) -> Self {
        Self(Arc::new(AtomicU8::new(encode_state(state))))
    }

    pub fn get(&self) -> ConnectionState {
        decode_state(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, state: ConnectionState) {
        self.0.store(encode_state(state), Ordering::Release);
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new(ConnectionState::Unopened)
    }
}

fn encode_state(state: ConnectionState) -> u8 {
    match state {
        ConnectionState::Unopened => 0,
        ConnectionState::Started => 1,
        ConnectionState::Closed => 2,
    }
}

fn decode_state(raw: u8) -> ConnectionState {
    match raw {
        0 => ConnectionState::Unopened,
        1 => ConnectionState::Started,
        _ => ConnectionState::Closed,
    }
}

/// Serialized event ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportMessage {
    pub content_type: &'static str,
    pub body: Bytes,
}

impl TransportMessage {
    pub fn new(content_type: &'static str, body: impl Into<Bytes>) -> Self {
        Self {
            content_type,
            body: body.into(),
        }
    }
}

/// Publishing handle shared read-only by every worker
///
/// Implementations must not close or reconfigure the underlying connection.
#[trait_variant::make(BrokerSession: Send)]
pub trait LocalBrokerSession {
    /// Current state of the owning connection
    fn state(&self) -> ConnectionState;

    /// Publish one message to `destination`
    ///
    /// # Errors
    /// Returns a transport error; the caller bounds the call with a timeout.
    async fn publish(
        &self,
        destination: &Destination,
        message: TransportMessage,
    ) -> Result<(), ContractError>;
}

/// Broker connection, owned by the lifecycle (shutdown) path
#[trait_variant::make(BrokerConnection: Send)]
pub trait LocalBrokerConnection: Sync {
    /// Session type handed to publishers
    type Session: BrokerSession + Sync + 'static;

    /// Client id announced to the broker
    fn client_id(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> ConnectionState;

    /// Move the connection to `Started`
    async fn start(&mut self) -> Result<(), ContractError>;

    /// Shared publishing session
    fn session(&self) -> Arc<Self::Session>;

    /// Move the connection to `Closed` and release network resources
    ///
    /// Idempotent: closing a closed connection returns Ok.
    async fn close(&mut self) -> Result<(), ContractError>;
}

/// Connection factory
#[trait_variant::make(BrokerTransport: Send)]
pub trait LocalBrokerTransport: Sync {
    type Connection: BrokerConnection;

    /// Open (but do not start) a connection to `endpoint`
    async fn connect(
        &self,
        endpoint: &Endpoint,
        client_id: &str,
    ) -> Result<Self::Connection, ContractError>;
}
