//! Broker error types

use contracts::ContractError;
use thiserror::Error;

/// Transport-level failure
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Malformed STOMP frame
    #[error("malformed frame: {message}")]
    Frame { message: String },

    /// Broker refused the handshake or sent an ERROR frame
    #[error("broker error: {message}")]
    Rejected { message: String },

    /// Broker closed the stream
    #[error("connection closed by broker")]
    Disconnected,

    /// Socket error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BrokerError {
    pub fn frame(message: impl Into<String>) -> Self {
        Self::Frame {
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Attach the endpoint this error happened on
    pub fn into_connection_error(self, endpoint: impl Into<String>) -> ContractError {
        ContractError::connection(endpoint, self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
