//! Error types for the events crate.

use thiserror::Error;

/// Result type alias for event operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Event error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// Invalid event data or bus configuration.
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// Subscriber fell behind and missed events.
    #[error("subscriber lagged, {skipped} events skipped")]
    Lagged { skipped: u64 },

    /// Channel closed.
    #[error("event channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create an invalid event error.
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }
}
