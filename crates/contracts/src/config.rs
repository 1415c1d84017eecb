//! ForwarderConfig - Config Loader output
//!
//! Describes how to reach the broker, how events are published and how
//! dispatch is bounded. Every section has defaults so an empty file is valid.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete forwarder configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct ForwarderConfig {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Broker connection
    #[serde(default)]
    #[validate(nested)]
    pub connection: ConnectionConfig,

    /// Publish settings
    #[serde(default)]
    #[validate(nested)]
    pub publish: PublishConfig,

    /// Dispatch bounds
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ConnectionConfig {
    /// Endpoint descriptor, e.g. `failover:(tcp://localhost:61613)`
    #[serde(default = "default_uri")]
    #[validate(length(min = 1))]
    pub uri: String,

    /// Client id prefix; a unique suffix is appended per connection
    #[serde(default = "default_client_id_prefix")]
    #[validate(length(min = 1))]
    pub client_id_prefix: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            client_id_prefix: default_client_id_prefix(),
        }
    }
}

fn default_uri() -> String {
    "failover:(tcp://localhost:61613)".to_string()
}

fn default_client_id_prefix() -> String {
    "LOG4NET-Appenders-ActiveMQ".to_string()
}

/// Message encoding on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFormat {
    /// JSON (human-readable, larger)
    #[default]
    Json,
    /// Bincode (binary, compact)
    Bincode,
}

impl MessageFormat {
    /// MIME type sent alongside the body
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Bincode => "application/x-bincode",
        }
    }

    /// Reverse of `content_type`
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            "application/json" => Some(Self::Json),
            "application/x-bincode" => Some(Self::Bincode),
            _ => None,
        }
    }
}

/// Publish settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PublishConfig {
    /// Destination prefix; events go to `<topic_prefix>.<source>`
    #[serde(default = "default_topic_prefix")]
    #[validate(length(min = 1))]
    pub topic_prefix: String,

    /// Wire format
    #[serde(default)]
    pub format: MessageFormat,

    /// Per-message send timeout (ms)
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

impl PublishConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            topic_prefix: default_topic_prefix(),
            format: MessageFormat::default(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

fn default_topic_prefix() -> String {
    "LOG4NET".to_string()
}

fn default_send_timeout_ms() -> u64 {
    500
}

/// Dispatch bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum batches in flight at once (0 = unbounded)
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// How long shutdown waits for in-flight batches (ms)
    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,

    /// Events per batch when the forwarder does its own buffering
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl DispatchConfig {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }

    /// `None` when unbounded
    pub fn max_in_flight(&self) -> Option<usize> {
        (self.max_in_flight > 0).then_some(self.max_in_flight)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            drain_timeout_ms: default_drain_timeout_ms(),
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_max_in_flight() -> usize {
    64
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

fn default_buffer_size() -> usize {
    512
}
