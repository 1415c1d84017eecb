//! ErrorHandler - reporting channel for failures the core swallows

/// Receives every failure the forwarder turns into a report instead of an error
///
/// Called from background workers; implementations must be cheap and must not panic.
pub trait ErrorHandler: Send + Sync {
    /// Report a human-readable message with an optional cause
    fn error(&self, message: &str, cause: Option<&(dyn std::error::Error + 'static)>);
}
