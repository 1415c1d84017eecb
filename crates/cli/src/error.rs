//! Error types for CLI operations.

use contracts::ContractError;
use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration invalid after CLI overrides
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(#[source] ContractError),

    /// Broker could not be reached or refused the session
    #[error("Failed to connect to broker at {uri}: {source}")]
    BrokerConnection {
        uri: String,
        #[source]
        source: ContractError,
    },

    /// No runtime to schedule batches on
    #[error("Executor unavailable: {0}")]
    Executor(#[from] dispatcher::SpawnError),

    /// Error closing the connection
    #[error("Error during shutdown: {message}")]
    Shutdown { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn broker_connection(uri: impl Into<String>, source: ContractError) -> Self {
        Self::BrokerConnection {
            uri: uri.into(),
            source,
        }
    }

    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown {
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
