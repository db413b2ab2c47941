//! NATS core pub/sub bus.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use fanout_telemetry::metrics::BUS_MESSAGES_RECEIVED_TOTAL;
use futures::StreamExt;
use metrics::counter;
use tracing::{debug, info, warn};

use crate::{Bus, BusError, PayloadHandler, Result, Subscription};

/// Bus backed by a NATS connection.
///
/// Every relay instance subscribed to a subject receives each payload
/// published to it, which is how fan-out crosses process boundaries.
#[derive(Clone)]
pub struct NatsBus {
    client: async_nats::Client,
}

impl NatsBus {
    /// Connect to a NATS server.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        info!(url, "connected to NATS");
        Ok(Self { client })
    }

    /// Wrap an existing client.
    pub fn from_client(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Bus for NatsBus {
    fn name(&self) -> &'static str {
        "nats"
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<Subscription> {
        let mut subscriber = self
            .client
            .subscribe(topic.to_string())
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        // Make sure the server has processed the SUB before reporting success.
        self.client
            .flush()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;
        debug!(topic, "NATS subscription opened");

        let label = topic.to_string();
        Ok(Subscription::spawn(topic, move |cancel| async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        if let Err(e) = subscriber.unsubscribe().await {
                            warn!(topic = %label, error = %e, "NATS unsubscribe failed");
                        }
                        break;
                    }
                    message = subscriber.next() => match message {
                        Some(message) => {
                            counter!(BUS_MESSAGES_RECEIVED_TOTAL).increment(1);
                            handler.handle(message.payload).await;
                        }
                        None => break,
                    },
                }
            }
            debug!(topic = %label, "NATS subscription closed");
        }))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.client
            .publish(topic.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }
}
