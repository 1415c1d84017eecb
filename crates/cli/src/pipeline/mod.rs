//! Forwarding pipeline module.

mod forwarder;
mod stats;

pub use forwarder::Forwarder;
pub use stats::ForwardStats;
