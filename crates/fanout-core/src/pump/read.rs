//! Read pump: the only reader of a connection.

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::PumpConfig;
use crate::client::ClientId;
use crate::error::TransportError;
use crate::frame::Frame;
use crate::hub::HubHandle;
use crate::normalize::normalize;

/// Why a read pump stopped.
#[derive(Debug)]
pub enum ReadOutcome {
    /// The peer closed the connection.
    Closed,
    /// The write pump ended first.
    Cancelled,
    /// The hub stopped accepting requests.
    HubStopped,
    /// Read error, deadline or size violation.
    Failed(TransportError),
}

/// Read messages from `stream` until it ends or fails, forwarding each
/// normalised payload to the hub.
///
/// On exit the client is unregistered and the shared token is cancelled.
pub async fn read_pump<S>(
    mut stream: S,
    client_id: ClientId,
    hub: HubHandle,
    config: PumpConfig,
    cancel: CancellationToken,
) -> ReadOutcome
where
    S: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    let outcome = read_loop(&mut stream, &hub, &config, &cancel).await;
    match &outcome {
        ReadOutcome::Closed => info!("peer closed connection"),
        ReadOutcome::Cancelled => debug!("read pump cancelled"),
        ReadOutcome::HubStopped => info!("hub stopped, closing connection"),
        ReadOutcome::Failed(error) => warn!(error = %error, "read pump failed"),
    }

    if hub.unregister(client_id).await.is_err() {
        debug!("hub already stopped during unregister");
    }
    cancel.cancel();
    outcome
}

async fn read_loop<S>(
    stream: &mut S,
    hub: &HubHandle,
    config: &PumpConfig,
    cancel: &CancellationToken,
) -> ReadOutcome
where
    S: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    let mut deadline = Instant::now() + config.pong_wait;
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => return ReadOutcome::Cancelled,
            next = timeout_at(deadline, stream.next()) => next,
        };
        let frame = match next {
            Err(_) => return ReadOutcome::Failed(TransportError::ReadTimeout(config.pong_wait)),
            Ok(None) => return ReadOutcome::Closed,
            Ok(Some(Err(error))) => return ReadOutcome::Failed(error),
            Ok(Some(Ok(frame))) => frame,
        };

        let payload = match frame {
            Frame::Pong(_) => {
                deadline = Instant::now() + config.pong_wait;
                trace!("pong received, read deadline extended");
                continue;
            }
            Frame::Ping(_) => continue,
            Frame::Close => return ReadOutcome::Closed,
            Frame::Text(text) => Bytes::from(text),
            Frame::Binary(bytes) => bytes,
        };

        if payload.len() > config.max_message_size {
            return ReadOutcome::Failed(TransportError::FrameTooLarge {
                size: payload.len(),
                limit: config.max_message_size,
            });
        }

        let message = normalize(&payload);
        trace!(bytes = message.len(), "forwarding client message");
        tokio::select! {
            () = cancel.cancelled() => return ReadOutcome::Cancelled,
            submitted = hub.broadcast(message) => {
                if submitted.is_err() {
                    return ReadOutcome::HubStopped;
                }
            }
        }
    }
}
