//! Write pump: the only writer of a connection.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use fanout_telemetry::metrics::{WS_FRAMES_SENT_TOTAL, WS_PAYLOADS_REJECTED_TOTAL};
use futures::{Sink, SinkExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::PumpConfig;
use crate::envelope::attach_origin;
use crate::error::TransportError;
use crate::frame::Frame;

/// Why a write pump stopped.
#[derive(Debug)]
pub enum WriteOutcome {
    /// The hub closed the mailbox; a close frame was sent.
    MailboxClosed,
    /// The read pump ended first.
    Cancelled,
    /// A write failed or exceeded its deadline.
    Failed(TransportError),
}

/// Drain the mailbox into `sink`, sending a ping every `ping_period`.
///
/// Items already queued when one is taken are coalesced into the same text
/// frame, one encoded object per line. Items that are not JSON objects are
/// logged and skipped.
pub async fn write_pump<W>(
    mut sink: W,
    mut mailbox: mpsc::Receiver<Bytes>,
    origin: Arc<str>,
    config: PumpConfig,
    cancel: CancellationToken,
) -> WriteOutcome
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    let outcome = match write_loop(&mut sink, &mut mailbox, &origin, &config, &cancel).await {
        Ok(outcome) => outcome,
        Err(error) => WriteOutcome::Failed(error),
    };
    match &outcome {
        WriteOutcome::MailboxClosed => info!("mailbox closed, connection closed"),
        WriteOutcome::Cancelled => debug!("write pump cancelled"),
        WriteOutcome::Failed(error) => warn!(error = %error, "write pump failed"),
    }

    cancel.cancel();
    if timeout(config.write_wait, sink.close()).await.is_err() {
        debug!("connection close timed out");
    }
    outcome
}

async fn write_loop<W>(
    sink: &mut W,
    mailbox: &mut mpsc::Receiver<Bytes>,
    origin: &str,
    config: &PumpConfig,
    cancel: &CancellationToken,
) -> Result<WriteOutcome, TransportError>
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    let mut ping = interval_at(Instant::now() + config.ping_period, config.ping_period);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => return Ok(WriteOutcome::Cancelled),
            item = mailbox.recv() => {
                let Some(first) = item else {
                    send(sink, Frame::Close, config.write_wait).await?;
                    return Ok(WriteOutcome::MailboxClosed);
                };
                let batch = coalesce(first, mailbox, origin, config.mailbox_capacity);
                if let Some(text) = batch.text {
                    trace!(items = batch.items, bytes = text.len(), "writing frame");
                    send(sink, Frame::Text(text), config.write_wait).await?;
                    counter!(WS_FRAMES_SENT_TOTAL).increment(1);
                }
                if batch.mailbox_closed {
                    send(sink, Frame::Close, config.write_wait).await?;
                    return Ok(WriteOutcome::MailboxClosed);
                }
            }
            _ = ping.tick() => {
                trace!("sending ping");
                send(sink, Frame::Ping(Bytes::new()), config.write_wait).await?;
            }
        }
    }
}

async fn send<W>(sink: &mut W, frame: Frame, write_wait: Duration) -> Result<(), TransportError>
where
    W: Sink<Frame, Error = TransportError> + Unpin,
{
    timeout(write_wait, sink.send(frame))
        .await
        .map_err(|_| TransportError::WriteTimeout(write_wait))?
}

struct Batch {
    text: Option<String>,
    items: usize,
    mailbox_closed: bool,
}

/// Encode `first` plus whatever is already queued, up to `limit` extra items.
fn coalesce(first: Bytes, mailbox: &mut mpsc::Receiver<Bytes>, origin: &str, limit: usize) -> Batch {
    let mut text = String::new();
    let mut items = 0;
    let mut mailbox_closed = false;

    let mut push = |payload: &[u8]| match attach_origin(payload, origin) {
        Ok(encoded) => {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&encoded);
            items += 1;
        }
        Err(error) => {
            warn!(error = %error, bytes = payload.len(), "dropping outbound payload");
            counter!(WS_PAYLOADS_REJECTED_TOTAL).increment(1);
        }
    };

    push(&first[..]);
    for _ in 0..limit {
        match mailbox.try_recv() {
            Ok(payload) => push(&payload[..]),
            Err(TryRecvError::Empty) => break,
            Err(TryRecvError::Disconnected) => {
                mailbox_closed = true;
                break;
            }
        }
    }

    Batch {
        text: (items > 0).then_some(text),
        items,
        mailbox_closed,
    }
}
