//! Adapter between axum WebSockets and the relay's [`Frame`] pumps.

use std::future;

use axum::extract::ws::{Message, WebSocket};
use fanout_core::{Frame, TransportError};
use futures::{Sink, SinkExt, Stream, StreamExt};

/// Convert an inbound axum message.
pub fn from_ws(message: Message) -> Frame {
    match message {
        Message::Text(text) => Frame::Text(text.as_str().to_owned()),
        Message::Binary(bytes) => Frame::Binary(bytes),
        Message::Ping(bytes) => Frame::Ping(bytes),
        Message::Pong(bytes) => Frame::Pong(bytes),
        Message::Close(_) => Frame::Close,
    }
}

/// Convert an outbound frame.
pub fn to_ws(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes),
        Frame::Ping(bytes) => Message::Ping(bytes),
        Frame::Pong(bytes) => Message::Pong(bytes),
        Frame::Close => Message::Close(None),
    }
}

fn transport_error(error: &axum::Error) -> TransportError {
    TransportError::Io(error.to_string())
}

/// Split an upgraded socket into a frame stream and a frame sink.
pub fn split_socket(
    socket: WebSocket,
) -> (
    impl Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static,
    impl Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
) {
    let (sink, stream) = socket.split();
    let reader = stream.map(|item| item.map(from_ws).map_err(|e| transport_error(&e)));
    let writer = sink
        .sink_map_err(|e| transport_error(&e))
        .with(|frame: Frame| future::ready(Ok::<_, TransportError>(to_ws(frame))));
    (reader, writer)
}
