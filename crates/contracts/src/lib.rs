//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates only depend on this crate, never on each other in reverse.
//!
//! ## Model
//! - `LogEvent` / `Batch`: what the logging front-end hands over
//! - `Destination`: broker topic derived from a prefix and the event source
//! - `BrokerTransport` / `BrokerConnection` / `BrokerSession`: transport boundary
//! - `ErrorHandler`: the reporting channel for failures that never propagate

mod config;
mod destination;
mod endpoint;
mod error;
mod event;
mod report;
mod transport;

pub use config::*;
pub use destination::Destination;
pub use endpoint::{BrokerAddress, Endpoint};
pub use error::*;
pub use event::*;
pub use report::ErrorHandler;
pub use transport::*;
