//! # fanout-bus
//!
//! The publish/subscribe boundary the relay consumes.
//!
//! A [`Bus`] opens named subscriptions that feed every inbound payload to a
//! [`PayloadHandler`], and publishes payloads to a topic. A subscription is
//! owned through a [`Subscription`] handle; closing (or dropping) the handle
//! releases it.
//!
//! | Implementation | Use |
//! |----------------|-----|
//! | [`InProcessBus`] | single process, tests, several hubs sharing one bus |
//! | `NatsBus` (feature `nats`) | cross-instance fan-out over NATS core pub/sub |

#![deny(unsafe_code)]

mod in_process;
#[cfg(feature = "nats")]
mod nats;
mod subscription;

pub use in_process::InProcessBus;
#[cfg(feature = "nats")]
pub use nats::NatsBus;
pub use subscription::Subscription;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;

/// Errors raised at the bus boundary.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// Could not reach the bus.
    #[error("bus connect failed: {0}")]
    Connect(String),
    /// Opening a subscription failed.
    #[error("bus subscribe failed: {0}")]
    Subscribe(String),
    /// Publishing a payload failed.
    #[error("bus publish failed: {0}")]
    Publish(String),
}

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Receives payloads delivered by a subscription.
///
/// The returned future is awaited before the next payload is delivered, so a
/// slow handler backpressures its own subscription only.
pub trait PayloadHandler: Send + Sync + 'static {
    /// Handle one inbound payload.
    fn handle(&self, payload: Bytes) -> BoxFuture<'static, ()>;
}

/// A publish/subscribe bus.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Short implementation name for logs.
    fn name(&self) -> &'static str;

    /// Open a subscription on `topic` delivering payloads to `handler`.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn PayloadHandler>) -> Result<Subscription>;

    /// Publish `payload` to every subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        assert_eq!(
            BusError::Subscribe("no route".into()).to_string(),
            "bus subscribe failed: no route"
        );
        assert!(BusError::Publish("closed".into()).to_string().contains("publish"));
    }
}
