//! Server errors.

use fanout_bus::BusError;
use thiserror::Error;

/// Failure to start or run the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// An allowed origin is not a valid header value.
    #[error("invalid allowed origin {0:?}")]
    InvalidOrigin(String),
    /// The shared bus subscription could not be opened.
    #[error(transparent)]
    Bus(#[from] BusError),
    /// Other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
