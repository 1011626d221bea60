//! Completion broadcast: every successfully fetched URL, to every subscriber.
//!
//! Failures are not broadcast; they only reach the request's own continuation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Broadcast channel capacity for completed URLs.
const CHANNEL_CAPACITY: usize = 256;

pub struct CompletionBroadcast {
    sender: broadcast::Sender<String>,
}

impl CompletionBroadcast {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Publish a completed URL. Fire-and-forget: a no-op without subscribers.
    pub fn publish(&self, url: &str) {
        if self.sender.receiver_count() > 0 {
            tracing::trace!(url, "broadcasting completion");
            let _ = self.sender.send(url.to_string());
        }
    }

    /// Raw receiver. A receiver that falls more than the channel capacity
    /// behind sees `RecvError::Lagged` and skips ahead.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }

    /// Run `handler` on `runtime` for each completed URL until the returned
    /// [`Subscription`] is dropped or unsubscribed.
    pub fn subscribe_fn<F>(&self, runtime: &Handle, mut handler: F) -> Subscription
    where
        F: FnMut(&str) + Send + 'static,
    {
        let mut rx = self.sender.subscribe();
        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&cancelled);
        let task = runtime.spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(_) if stop.load(Ordering::Acquire) => break,
                    Ok(url) => handler(&url),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "completion subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Subscription {
            task: Some(task),
            cancelled,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for CompletionBroadcast {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CompletionBroadcast {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionBroadcast")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Live handler registration. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Subscription {
    task: Option<JoinHandle<()>>,
    /// Set on detach; the forwarding loop checks it before every handler call.
    cancelled: Arc<AtomicBool>,
}

impl Subscription {
    /// Detach the handler. URLs published afterwards are not delivered to it.
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
