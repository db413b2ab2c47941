//! Hub: the single owner of the client registry.
//!
//! Register, unregister and broadcast requests from every producer travel
//! over one bounded command channel and are applied one at a time by
//! [`Hub::run`]. Producers that find the channel full wait, which is the
//! backpressure path for both bus deliveries and inbound client messages.
//!
//! Delivery into a client's mailbox never blocks: a full mailbox evicts the
//! client, closing its mailbox and releasing its bus subscription.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use fanout_bus::{PayloadHandler, Subscription};
use fanout_telemetry::metrics::{
    HUB_BROADCASTS_TOTAL, WS_BROADCAST_EVICTIONS_TOTAL, WS_CONNECTIONS_ACTIVE,
    WS_DISCONNECTIONS_TOTAL,
};
use futures::future::BoxFuture;
use metrics::{counter, gauge};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::client::ClientId;
use crate::error::HubClosed;

/// What the hub keeps for a registered client.
#[derive(Debug)]
pub struct Registration {
    /// Client identity.
    pub id: ClientId,
    /// Sending half of the client's mailbox. The hub holds the only copy.
    pub mailbox: mpsc::Sender<Bytes>,
    /// Per-connection bus subscription, released on removal.
    pub subscription: Option<Subscription>,
}

/// Registry counters reported by [`HubHandle::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Clients currently registered.
    pub clients: usize,
    /// Broadcasts applied since start.
    pub broadcasts: u64,
    /// Clients evicted for a full mailbox since start.
    pub evictions: u64,
}

#[derive(Debug)]
enum HubCommand {
    Register(Registration),
    Unregister(ClientId),
    Broadcast(Bytes),
    Stats(oneshot::Sender<HubStats>),
}

struct Member {
    mailbox: mpsc::Sender<Bytes>,
    subscription: Option<Subscription>,
}

/// Registry actor. Create with [`Hub::new`], then drive with [`Hub::run`].
pub struct Hub {
    name: Arc<str>,
    clients: HashMap<ClientId, Member>,
    commands: mpsc::Receiver<HubCommand>,
    broadcasts: u64,
    evictions: u64,
}

impl Hub {
    /// Create a hub and its request handle. `request_buffer` bounds the
    /// number of queued requests before producers wait.
    pub fn new(name: impl Into<Arc<str>>, request_buffer: usize) -> (Self, HubHandle) {
        let name = name.into();
        let (tx, rx) = mpsc::channel(request_buffer.max(1));
        let hub = Self {
            name: Arc::clone(&name),
            clients: HashMap::new(),
            commands: rx,
            broadcasts: 0,
            evictions: 0,
        };
        (hub, HubHandle { tx, name })
    }

    /// Apply requests until every [`HubHandle`] has been dropped.
    pub async fn run(mut self) {
        info!(server_name = %self.name, "hub started");
        while let Some(command) = self.commands.recv().await {
            self.apply(command);
        }
        let remaining = self.clients.len();
        for (id, member) in self.clients.drain() {
            release(&id, member);
        }
        gauge!(WS_CONNECTIONS_ACTIVE).set(0.0);
        info!(server_name = %self.name, remaining, "hub stopped");
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Whether `id` is registered.
    pub fn is_registered(&self, id: &ClientId) -> bool {
        self.clients.contains_key(id)
    }

    fn apply(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(registration) => self.register(registration),
            HubCommand::Unregister(id) => self.unregister(&id),
            HubCommand::Broadcast(payload) => self.broadcast(&payload),
            HubCommand::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn register(&mut self, registration: Registration) {
        let Registration {
            id,
            mailbox,
            subscription,
        } = registration;
        let member = Member {
            mailbox,
            subscription,
        };
        if let Some(previous) = self.clients.insert(id.clone(), member) {
            warn!(client_id = %id, "client re-registered, replacing previous entry");
            release(&id, previous);
        }
        self.record_size();
        info!(client_id = %id, clients = self.clients.len(), "client registered");
    }

    fn unregister(&mut self, id: &ClientId) {
        let Some(member) = self.clients.remove(id) else {
            debug!(client_id = %id, "unregister for unknown client ignored");
            return;
        };
        release(id, member);
        self.record_size();
        info!(client_id = %id, clients = self.clients.len(), "client unregistered");
    }

    fn broadcast(&mut self, payload: &Bytes) {
        self.broadcasts += 1;
        counter!(HUB_BROADCASTS_TOTAL).increment(1);

        let mut dropped = Vec::new();
        for (id, member) in &self.clients {
            match member.mailbox.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(client_id = %id, "mailbox full, evicting slow client");
                    dropped.push((id.clone(), true));
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client_id = %id, "mailbox closed, removing client");
                    dropped.push((id.clone(), false));
                }
            }
        }

        if dropped.is_empty() {
            return;
        }
        for (id, slow) in dropped {
            if let Some(member) = self.clients.remove(&id) {
                release(&id, member);
            }
            if slow {
                self.evictions += 1;
                counter!(WS_BROADCAST_EVICTIONS_TOTAL).increment(1);
            }
        }
        self.record_size();
        info!(clients = self.clients.len(), "registry size after eviction");
    }

    fn stats(&self) -> HubStats {
        HubStats {
            clients: self.clients.len(),
            broadcasts: self.broadcasts,
            evictions: self.evictions,
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn record_size(&self) {
        gauge!(WS_CONNECTIONS_ACTIVE).set(self.clients.len() as f64);
    }
}

/// Drop the hub's mailbox sender, closing it, and release the subscription.
fn release(id: &ClientId, member: Member) {
    let Member {
        mailbox,
        subscription,
    } = member;
    drop(mailbox);
    if let Some(subscription) = subscription {
        debug!(client_id = %id, topic = subscription.topic(), "releasing bus subscription");
        subscription.close();
    }
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
}

/// Cloneable request side of the hub.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubCommand>,
    name: Arc<str>,
}

impl std::fmt::Debug for HubHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubHandle")
            .field("name", &self.name)
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl HubHandle {
    /// Server identity stamped onto outbound messages.
    pub fn server_name(&self) -> &str {
        &self.name
    }

    /// Shared server identity.
    pub fn server_name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Add a client. Waits while the request channel is full.
    pub async fn register(&self, registration: Registration) -> Result<(), HubClosed> {
        self.submit(HubCommand::Register(registration)).await
    }

    /// Remove a client. Unknown ids are ignored by the hub.
    pub async fn unregister(&self, id: ClientId) -> Result<(), HubClosed> {
        self.submit(HubCommand::Unregister(id)).await
    }

    /// Deliver `payload` to every client registered when the hub applies it.
    pub async fn broadcast(&self, payload: Bytes) -> Result<(), HubClosed> {
        self.submit(HubCommand::Broadcast(payload)).await
    }

    /// Snapshot the registry counters. The reply reflects every request
    /// submitted before this one.
    pub async fn stats(&self) -> Result<HubStats, HubClosed> {
        let (reply, rx) = oneshot::channel();
        self.submit(HubCommand::Stats(reply)).await?;
        rx.await.map_err(|_| HubClosed)
    }

    /// Whether the hub has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn submit(&self, command: HubCommand) -> Result<(), HubClosed> {
        self.tx.send(command).await.map_err(|_| HubClosed)
    }
}

impl PayloadHandler for HubHandle {
    fn handle(&self, payload: Bytes) -> BoxFuture<'static, ()> {
        let hub = self.clone();
        Box::pin(async move {
            if hub.broadcast(payload).await.is_err() {
                debug!("bus message dropped, hub stopped");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;

    fn mailbox(capacity: usize, id: &str) -> (Registration, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity);
        let registration = Registration {
            id: ClientId::from(id),
            mailbox: tx,
            subscription: None,
        };
        (registration, rx)
    }

    fn payload(text: &'static str) -> Bytes {
        Bytes::from_static(text.as_bytes())
    }

    #[test]
    fn broadcast_reaches_every_registered_client() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let (a, mut rx_a) = mailbox(4, "a");
        let (b, mut rx_b) = mailbox(4, "b");
        hub.apply(HubCommand::Register(a));
        hub.apply(HubCommand::Register(b));

        hub.apply(HubCommand::Broadcast(payload("m")));

        assert_eq!(rx_a.try_recv().unwrap(), payload("m"));
        assert_eq!(rx_b.try_recv().unwrap(), payload("m"));
        assert_eq!(hub.stats().broadcasts, 1);
    }

    #[test]
    fn unregister_before_broadcast_excludes_client() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let (a, mut rx_a) = mailbox(4, "a");
        let (b, mut rx_b) = mailbox(4, "b");
        hub.apply(HubCommand::Register(a));
        hub.apply(HubCommand::Register(b));
        hub.apply(HubCommand::Unregister(ClientId::from("b")));

        hub.apply(HubCommand::Broadcast(payload("x")));

        assert_eq!(rx_a.try_recv().unwrap(), payload("x"));
        assert_eq!(rx_b.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn late_registrant_misses_earlier_broadcast() {
        let (mut hub, _handle) = Hub::new("s", 8);
        hub.apply(HubCommand::Broadcast(payload("early")));
        let (a, mut rx_a) = mailbox(4, "a");
        hub.apply(HubCommand::Register(a));
        hub.apply(HubCommand::Broadcast(payload("late")));

        assert_eq!(rx_a.try_recv().unwrap(), payload("late"));
        assert_eq!(rx_a.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn full_mailbox_evicts_client() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let (slow, mut rx_slow) = mailbox(1, "slow");
        let (fast, mut rx_fast) = mailbox(4, "fast");
        hub.apply(HubCommand::Register(slow));
        hub.apply(HubCommand::Register(fast));

        hub.apply(HubCommand::Broadcast(payload("1")));
        hub.apply(HubCommand::Broadcast(payload("2")));

        assert!(!hub.is_registered(&ClientId::from("slow")));
        assert!(hub.is_registered(&ClientId::from("fast")));
        assert_eq!(hub.stats().evictions, 1);

        // Queued item stays readable, then the mailbox reports closed.
        assert_eq!(rx_slow.try_recv().unwrap(), payload("1"));
        assert_eq!(rx_slow.try_recv(), Err(TryRecvError::Disconnected));

        assert_eq!(rx_fast.try_recv().unwrap(), payload("1"));
        assert_eq!(rx_fast.try_recv().unwrap(), payload("2"));

        // Later broadcasts never reach the evicted client and do not fail.
        hub.apply(HubCommand::Broadcast(payload("3")));
        assert_eq!(rx_fast.try_recv().unwrap(), payload("3"));
    }

    #[test]
    fn dropped_receiver_removed_without_eviction_count() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let (a, rx_a) = mailbox(4, "a");
        hub.apply(HubCommand::Register(a));
        drop(rx_a);

        hub.apply(HubCommand::Broadcast(payload("m")));

        assert_eq!(hub.client_count(), 0);
        assert_eq!(hub.stats().evictions, 0);
    }

    #[test]
    fn unregister_unknown_is_noop() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let (a, _rx_a) = mailbox(4, "a");
        hub.apply(HubCommand::Register(a));
        hub.apply(HubCommand::Unregister(ClientId::from("ghost")));
        hub.apply(HubCommand::Unregister(ClientId::from("a")));
        hub.apply(HubCommand::Unregister(ClientId::from("a")));
        assert_eq!(hub.client_count(), 0);
    }

    #[test]
    fn re_register_replaces_and_closes_previous_mailbox() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let (first, mut rx_first) = mailbox(4, "a");
        let (second, mut rx_second) = mailbox(4, "a");
        hub.apply(HubCommand::Register(first));
        hub.apply(HubCommand::Register(second));

        hub.apply(HubCommand::Broadcast(payload("m")));

        assert_eq!(hub.client_count(), 1);
        assert_eq!(rx_first.try_recv(), Err(TryRecvError::Disconnected));
        assert_eq!(rx_second.try_recv().unwrap(), payload("m"));
    }

    #[tokio::test]
    async fn eviction_releases_subscription() {
        let (mut hub, _handle) = Hub::new("s", 8);
        let subscription = Subscription::spawn("t", |cancel| async move {
            cancel.cancelled().await;
        });
        let observer = subscription.cancel_token();
        let (tx, _rx) = mpsc::channel(1);
        hub.apply(HubCommand::Register(Registration {
            id: ClientId::from("slow"),
            mailbox: tx,
            subscription: Some(subscription),
        }));

        hub.apply(HubCommand::Broadcast(payload("1")));
        assert!(!observer.is_cancelled());
        hub.apply(HubCommand::Broadcast(payload("2")));

        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn handle_requests_are_applied_in_order() {
        let (hub, handle) = Hub::new("server 1", 8);
        let task = tokio::spawn(hub.run());

        let (a, mut rx_a) = mailbox(4, "a");
        let (b, mut rx_b) = mailbox(4, "b");
        handle.register(a).await.unwrap();
        handle.register(b).await.unwrap();
        handle.unregister(ClientId::from("b")).await.unwrap();
        handle.broadcast(payload("x")).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.clients, 1);
        assert_eq!(stats.broadcasts, 1);
        assert_eq!(rx_a.recv().await.unwrap(), payload("x"));
        assert!(rx_b.recv().await.is_none());

        drop(handle);
        task.await.unwrap();
        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn handle_reports_closed_hub() {
        let (hub, handle) = Hub::new("s", 1);
        drop(hub);
        assert!(handle.is_closed());
        assert_eq!(handle.broadcast(payload("m")).await, Err(HubClosed));
        assert_eq!(handle.stats().await, Err(HubClosed));
    }

    #[tokio::test]
    async fn payload_handler_forwards_to_hub() {
        let (hub, handle) = Hub::new("s", 8);
        let task = tokio::spawn(hub.run());
        let (a, mut rx_a) = mailbox(4, "a");
        handle.register(a).await.unwrap();

        PayloadHandler::handle(&handle, payload("bus")).await;

        assert_eq!(rx_a.recv().await.unwrap(), payload("bus"));
        drop(handle);
        task.await.unwrap();
    }

    #[derive(Debug, Clone)]
    enum Op {
        Register(u8),
        Unregister(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6).prop_map(Op::Register),
            (0u8..6).prop_map(Op::Unregister),
        ]
    }

    proptest! {
        #[test]
        fn membership_matches_net_effect(ops in proptest::collection::vec(op(), 0..64)) {
            let (mut hub, _handle) = Hub::new("s", 8);
            let mut expected = HashSet::new();
            let mut receivers = Vec::new();
            for op in ops {
                match op {
                    Op::Register(n) => {
                        let (registration, rx) = mailbox(1, &format!("c{n}"));
                        receivers.push(rx);
                        hub.apply(HubCommand::Register(registration));
                        let _ = expected.insert(n);
                    }
                    Op::Unregister(n) => {
                        hub.apply(HubCommand::Unregister(ClientId::from(format!("c{n}").as_str())));
                        let _ = expected.remove(&n);
                    }
                }
            }
            prop_assert_eq!(hub.client_count(), expected.len());
            for n in 0u8..6 {
                let id = ClientId::from(format!("c{n}").as_str());
                prop_assert_eq!(hub.is_registered(&id), expected.contains(&n));
            }
        }
    }
}
