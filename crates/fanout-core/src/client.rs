//! Per-connection state and connection acceptance.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use fanout_bus::{Bus, PayloadHandler, Subscription};
use fanout_telemetry::metrics::WS_CONNECTIONS_TOTAL;
use futures::{Sink, Stream};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, Instrument};
use uuid::Uuid;

use crate::error::{AcceptError, TransportError};
use crate::frame::Frame;
use crate::hub::{HubHandle, Registration};
use crate::pump::{read_pump, write_pump, PumpConfig, ReadOutcome, WriteOutcome};

/// Unique client identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(Arc<str>);

impl ClientId {
    /// Fresh time-ordered id.
    pub fn generate() -> Self {
        Self(format!("client_{}", Uuid::now_v7()).into())
    }

    /// Id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

/// A connection before registration: identity, mailbox and optional
/// subscription.
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    mailbox_tx: mpsc::Sender<Bytes>,
    mailbox_rx: mpsc::Receiver<Bytes>,
    subscription: Option<Subscription>,
}

impl Client {
    /// New client with a mailbox of `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let (mailbox_tx, mailbox_rx) = mpsc::channel(capacity.max(1));
        Self {
            id: ClientId::generate(),
            mailbox_tx,
            mailbox_rx,
            subscription: None,
        }
    }

    /// Client identity.
    pub fn id(&self) -> &ClientId {
        &self.id
    }

    /// Tie a bus subscription to this client's lifetime in the hub.
    pub fn attach_subscription(&mut self, subscription: Subscription) {
        self.subscription = Some(subscription);
    }

    /// Split into the hub's registration and the write pump's receiver.
    pub fn into_parts(self) -> (Registration, mpsc::Receiver<Bytes>) {
        let registration = Registration {
            id: self.id,
            mailbox: self.mailbox_tx,
            subscription: self.subscription,
        };
        (registration, self.mailbox_rx)
    }
}

/// How a new connection relates to the bus.
#[derive(Clone, Copy)]
pub enum BusBinding<'a> {
    /// Open a dedicated subscription for this connection. Each live
    /// connection then forwards every bus message to the hub once.
    PerConnection {
        /// Bus to subscribe on.
        bus: &'a dyn Bus,
        /// Topic to subscribe to.
        topic: &'a str,
    },
    /// The server holds one subscription for the whole hub.
    Shared,
}

/// Running pumps of an accepted connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Registered client id.
    pub id: ClientId,
    /// Cancelled when either pump ends.
    pub cancel: CancellationToken,
    /// Read pump task.
    pub read: JoinHandle<ReadOutcome>,
    /// Write pump task.
    pub write: JoinHandle<WriteOutcome>,
}

/// Register a new connection with the hub and start its pumps.
///
/// With [`BusBinding::PerConnection`] the subscription is opened first; if
/// that fails the connection is not registered. Cancelling `cancel` closes
/// the connection.
pub async fn accept_connection<R, W>(
    hub: &HubHandle,
    binding: BusBinding<'_>,
    reader: R,
    writer: W,
    config: PumpConfig,
    cancel: CancellationToken,
) -> Result<ConnectionHandle, AcceptError>
where
    R: Stream<Item = Result<Frame, TransportError>> + Unpin + Send + 'static,
    W: Sink<Frame, Error = TransportError> + Unpin + Send + 'static,
{
    let mut client = Client::new(config.mailbox_capacity);

    if let BusBinding::PerConnection { bus, topic } = binding {
        let handler: Arc<dyn PayloadHandler> = Arc::new(hub.clone());
        let subscription = bus.subscribe(topic, handler).await?;
        client.attach_subscription(subscription);
    }

    let id = client.id().clone();
    let (registration, mailbox) = client.into_parts();
    hub.register(registration).await?;
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    info!(client_id = %id, "connection accepted");

    let span = tracing::info_span!("connection", client_id = %id);
    let write = tokio::spawn(
        write_pump(
            writer,
            mailbox,
            hub.server_name_arc(),
            config.clone(),
            cancel.clone(),
        )
        .instrument(span.clone()),
    );
    let read = tokio::spawn(
        read_pump(reader, id.clone(), hub.clone(), config, cancel.clone()).instrument(span),
    );

    Ok(ConnectionHandle {
        id,
        cancel,
        read,
        write,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_prefixed() {
        let a = ClientId::generate();
        let b = ClientId::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("client_"));
        assert_eq!(a.to_string(), a.as_str());
    }

    #[test]
    fn client_parts_share_one_mailbox() {
        let client = Client::new(2);
        let id = client.id().clone();
        let (registration, mut rx) = client.into_parts();
        assert_eq!(registration.id, id);
        assert!(registration.subscription.is_none());
        registration.mailbox.try_send(Bytes::from_static(b"m")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Bytes::from_static(b"m"));
        drop(registration);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn zero_capacity_clamped_to_one() {
        let client = Client::new(0);
        let (registration, _rx) = client.into_parts();
        assert!(registration.mailbox.try_send(Bytes::new()).is_ok());
    }
}
