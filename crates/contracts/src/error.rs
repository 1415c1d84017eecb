//! Layered error definitions
//!
//! Categorized by source: config / endpoint / transport / encoding

use thiserror::Error;

use crate::ConnectionState;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    /// Endpoint descriptor could not be parsed
    #[error("invalid endpoint '{uri}': {message}")]
    Endpoint { uri: String, message: String },

    // ===== Transport Errors =====
    /// Broker connection error
    #[error("broker connection error ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    /// Operation requires a started connection
    #[error("connection is {state}, expected started")]
    NotStarted { state: ConnectionState },

    /// Publish to a destination failed
    #[error("publish to '{destination}' failed: {message}")]
    Publish { destination: String, message: String },

    /// Event could not be turned into a transport message
    #[error("encode error: {message}")]
    Encode { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create endpoint parse error
    pub fn endpoint(uri: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Endpoint {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Create broker connection error
    pub fn connection(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create publish error
    pub fn publish(destination: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Publish {
            destination: destination.into(),
            message: message.into(),
        }
    }

    /// Create encode error
    pub fn encode(message: impl Into<String>) -> Self {
        Self::Encode {
            message: message.into(),
        }
    }
}
