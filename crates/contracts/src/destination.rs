//! Destination - broker topic name for one event

use std::fmt;

/// Named broker endpoint a message is published to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination(String);

impl Destination {
    /// Derive `prefix.source`. Pure; recomputed per event.
    pub fn derive(prefix: &str, source: &str) -> Self {
        Self(format!("{prefix}.{source}"))
    }

    /// Wrap an already-formed destination name
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Destination {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
