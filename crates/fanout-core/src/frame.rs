//! Transport-neutral WebSocket frames.

use bytes::Bytes;

/// One message or control frame on a connection.
///
/// Pumps speak `Frame`; the server adapts its WebSocket type to and from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// UTF-8 data message.
    Text(String),
    /// Binary data message.
    Binary(Bytes),
    /// Keepalive ping.
    Ping(Bytes),
    /// Keepalive reply.
    Pong(Bytes),
    /// Close handshake.
    Close,
}
