//! Read and write pumps of one connection.
//!
//! Each connection runs exactly two tasks: the read pump is the only reader
//! of the connection and the write pump the only writer. They share a
//! [`CancellationToken`](tokio_util::sync::CancellationToken); whichever ends
//! first cancels it and the other follows.

mod read;
mod write;

use std::time::Duration;

pub use read::{read_pump, ReadOutcome};
pub use write::{write_pump, WriteOutcome};

/// Timing and size limits for one connection.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Upper bound on a single frame write.
    pub write_wait: Duration,
    /// Read deadline, refreshed by each pong.
    pub pong_wait: Duration,
    /// Interval between pings. Must be shorter than `pong_wait`.
    pub ping_period: Duration,
    /// Largest accepted inbound message, in bytes.
    pub max_message_size: usize,
    /// Mailbox capacity in items.
    pub mailbox_capacity: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        let pong_wait = Duration::from_secs(60);
        Self {
            write_wait: Duration::from_secs(10),
            pong_wait,
            ping_period: pong_wait * 9 / 10,
            max_message_size: 512,
            mailbox_capacity: 256,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use futures::channel::mpsc as fmpsc;
    use futures::Sink;

    use crate::error::TransportError;
    use crate::frame::Frame;

    /// Sink that forwards frames to an unbounded channel.
    pub(crate) struct ChannelSink {
        tx: fmpsc::UnboundedSender<Frame>,
    }

    pub(crate) fn channel_sink() -> (ChannelSink, fmpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = fmpsc::unbounded();
        (ChannelSink { tx }, rx)
    }

    impl Sink<Frame> for ChannelSink {
        type Error = TransportError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Frame) -> Result<(), Self::Error> {
            self.tx
                .unbounded_send(item)
                .map_err(|e| TransportError::Io(e.to_string()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            self.tx.close_channel();
            Poll::Ready(Ok(()))
        }
    }

    /// Sink whose writes never complete.
    pub(crate) struct StalledSink;

    impl Sink<Frame> for StalledSink {
        type Error = TransportError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _item: Frame) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }
}
