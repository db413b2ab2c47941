//! Owned subscription handle.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A live bus subscription.
///
/// The delivery loop runs in its own task and stops when the handle is
/// closed or dropped.
#[derive(Debug)]
pub struct Subscription {
    topic: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Spawn a delivery loop. The loop must return once the token is cancelled.
    pub fn spawn<F, Fut>(topic: impl Into<String>, delivery: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(delivery(cancel.clone()));
        Self {
            topic: topic.into(),
            cancel,
            task,
        }
    }

    /// Topic this subscription listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Whether the subscription was released or its delivery loop ended.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.task.is_finished()
    }

    /// Token cancelled when the subscription is released.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Release the subscription.
    pub fn close(self) {
        tracing::debug!(topic = %self.topic, "closing bus subscription");
        self.cancel.cancel();
    }

    /// Release the subscription and wait for its delivery loop to finish.
    pub async fn close_and_wait(mut self) {
        self.cancel.cancel();
        let _ = (&mut self.task).await;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
