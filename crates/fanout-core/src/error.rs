//! Error types for the relay core.

use std::time::Duration;

use fanout_bus::BusError;
use thiserror::Error;

/// Connection I/O failure. Terminal for the pump that observes it.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No pong arrived within the read deadline.
    #[error("read deadline of {0:?} exceeded")]
    ReadTimeout(Duration),
    /// A frame write did not complete within the write deadline.
    #[error("write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),
    /// The peer sent a message larger than the configured limit.
    #[error("message of {size} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Received size in bytes.
        size: usize,
        /// Configured limit in bytes.
        limit: usize,
    },
    /// The underlying connection failed.
    #[error("connection error: {0}")]
    Io(String),
}

/// An outbound payload that cannot carry the server identity.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// Zero-length payload.
    #[error("empty payload")]
    Empty,
    /// Payload is not JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    /// Payload is JSON but not an object.
    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
    /// Re-serialisation failed.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),
}

/// The hub's control loop is no longer running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hub is not running")]
pub struct HubClosed;

/// Failure to establish a connection.
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The per-connection bus subscription could not be opened.
    #[error("subscription setup failed: {0}")]
    Subscribe(#[from] BusError),
    /// The hub refused the registration.
    #[error(transparent)]
    Hub(#[from] HubClosed),
}
