//! # Broker
//!
//! Broker transports behind the `contracts` transport traits.
//!
//! Responsibilities:
//! - STOMP 1.2 over TCP with failover address lists
//! - In-process topic broker with wildcard subscriptions
//! - Scriptable mock session for publisher tests

pub mod error;
pub mod frame;
pub mod memory;
pub mod mock;
pub mod stomp;

pub use contracts::{BrokerConnection, BrokerSession, BrokerTransport, ConnectionState};
pub use error::{BrokerError, Result};
pub use frame::Frame;
pub use memory::{
    Delivery, DestinationPattern, InMemoryBroker, InMemoryConnection, InMemorySession,
    Subscription,
};
pub use mock::{MockConfig, MockSession};
pub use stomp::{StompConnection, StompSession, StompTransport, DEFAULT_CONNECT_TIMEOUT};
