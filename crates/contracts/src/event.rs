//! LogEvent / Batch - logging front-end output
//!
//! The forwarder treats everything except `source` as opaque payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a log event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Level {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        };
        f.write_str(s)
    }
}

/// Immutable structured log record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Logical emitter (logger name), used to derive the destination
    pub source: String,

    /// Severity
    #[serde(default)]
    pub level: Level,

    /// Time the event was produced
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Rendered message
    #[serde(default)]
    pub message: String,

    /// Emitting thread name
    #[serde(default)]
    pub thread: Option<String>,

    /// Rendered exception / error chain
    #[serde(default)]
    pub exception: Option<String>,

    /// Free-form properties (host name, request id, ...)
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl LogEvent {
    /// Create an event stamped with the current time
    pub fn new(source: impl Into<String>, level: Level, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            level,
            timestamp: Utc::now(),
            message: message.into(),
            thread: None,
            exception: None,
            properties: BTreeMap::new(),
        }
    }

    /// Attach a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Attach the emitting thread name
    pub fn with_thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    /// Attach rendered exception text
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }
}

/// Sequence number assigned to a batch when it is submitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered group of events handed over in one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    events: Vec<LogEvent>,
}

impl Batch {
    pub fn new(events: Vec<LogEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LogEvent> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<LogEvent> {
        self.events
    }
}

impl From<Vec<LogEvent>> for Batch {
    fn from(events: Vec<LogEvent>) -> Self {
        Self::new(events)
    }
}

impl FromIterator<LogEvent> for Batch {
    fn from_iter<I: IntoIterator<Item = LogEvent>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a LogEvent;
    type IntoIter = std::slice::Iter<'a, LogEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_defaults() {
        let event: LogEvent = serde_json::from_str(r#"{"source":"MyLogger"}"#).unwrap();
        assert_eq!(event.source, "MyLogger");
        assert_eq!(event.level, Level::Info);
        assert!(event.properties.is_empty());
    }

    #[test]
    fn test_level_wire_name() {
        let json = serde_json::to_string(&Level::Error).unwrap();
        assert_eq!(json, "\"ERROR\"");
        assert_eq!(Level::Fatal.to_string(), "FATAL");
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch: Batch = (0..3)
            .map(|i| LogEvent::new(format!("src{i}"), Level::Info, "m"))
            .collect();
        let sources: Vec<_> = batch.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, ["src0", "src1", "src2"]);
    }
}
