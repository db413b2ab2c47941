//! Process-local bus built on `tokio::sync::broadcast`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fanout_telemetry::metrics::BUS_MESSAGES_RECEIVED_TOTAL;
use metrics::counter;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::{Bus, PayloadHandler, Result, Subscription};

/// Default per-topic channel capacity.
const DEFAULT_TOPIC_CAPACITY: usize = 1024;

/// In-process publish/subscribe bus.
///
/// Each topic is a broadcast channel created on first use. Subscribers that
/// fall more than the channel capacity behind skip the oldest payloads.
pub struct InProcessBus {
    topics: Mutex<HashMap<String, broadcast::Sender<Bytes>>>,
    capacity: usize,
}

impl InProcessBus {
    /// Create a bus with the default per-topic capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }

    /// Create a bus with a custom per-topic capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Current number of live subscribers on a topic.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for InProcessBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for InProcessBus {
    fn name(&self) -> &'static str {
        "in-process"
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<Subscription> {
        let mut rx = self.sender(topic).subscribe();
        let label = topic.to_string();
        debug!(topic, "in-process subscription opened");

        Ok(Subscription::spawn(topic, move |cancel| async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(payload) => {
                            counter!(BUS_MESSAGES_RECEIVED_TOTAL).increment(1);
                            handler.handle(payload).await;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(topic = %label, skipped, "subscription lagged, payloads skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!(topic = %label, "in-process subscription closed");
        }))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        // No subscribers is not an error: the payload is simply unobserved.
        if let Ok(receivers) = self.sender(topic).send(payload) {
            debug!(topic, receivers, "published");
        } else {
            debug!(topic, "published with no subscribers");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::channel_handler;

    const TIMEOUT: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = InProcessBus::new();
        let (handler, mut rx) = channel_handler();
        let _sub = bus.subscribe("updates", handler).await.unwrap();

        bus.publish("updates", Bytes::from_static(b"{\"a\":1}")).await.unwrap();

        let got = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(&got[..], b"{\"a\":1}");
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let bus = InProcessBus::new();
        let (h1, mut rx1) = channel_handler();
        let (h2, mut rx2) = channel_handler();
        let _s1 = bus.subscribe("updates", h1).await.unwrap();
        let _s2 = bus.subscribe("updates", h2).await.unwrap();
        assert_eq!(bus.subscriber_count("updates"), 2);

        bus.publish("updates", Bytes::from_static(b"x")).await.unwrap();

        assert_eq!(&tokio::time::timeout(TIMEOUT, rx1.recv()).await.unwrap().unwrap()[..], b"x");
        assert_eq!(&tokio::time::timeout(TIMEOUT, rx2.recv()).await.unwrap().unwrap()[..], b"x");
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = InProcessBus::new();
        let (handler, mut rx) = channel_handler();
        let _sub = bus.subscribe("a", handler).await.unwrap();

        bus.publish("b", Bytes::from_static(b"other")).await.unwrap();
        bus.publish("a", Bytes::from_static(b"mine")).await.unwrap();

        let got = tokio::time::timeout(TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(&got[..], b"mine");
    }

    #[tokio::test]
    async fn closed_subscription_stops_delivery() {
        let bus = InProcessBus::new();
        let (handler, mut rx) = channel_handler();
        let sub = bus.subscribe("updates", handler).await.unwrap();

        sub.close_and_wait().await;
        assert_eq!(bus.subscriber_count("updates"), 0);

        bus.publish("updates", Bytes::from_static(b"late")).await.unwrap();
        // The handler (and its sender) went away with the delivery loop.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = InProcessBus::new();
        assert!(bus.publish("nobody", Bytes::from_static(b"x")).await.is_ok());
        assert_eq!(bus.subscriber_count("nobody"), 0);
    }

    #[test]
    fn name_is_stable() {
        assert_eq!(InProcessBus::default().name(), "in-process");
    }
}
