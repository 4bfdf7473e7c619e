//! In-process event bus with one queue and one worker task per subscriber.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use homebus_domain::bus::BusMessage;
use homebus_domain::error::HubError;
use homebus_domain::topic::{Topic, TopicPattern};

use crate::ports::{Delivery, EventHandler, EventPublisher};

struct Subscriber {
    pattern: TopicPattern,
    sender: mpsc::UnboundedSender<Delivery>,
}

/// In-process event bus.
///
/// Each subscriber owns an unbounded FIFO queue drained by its own tokio
/// task, so `publish` never waits for handlers and a slow subscriber never
/// delays the others. Delivery order is preserved per subscriber only.
#[derive(Default)]
pub struct InProcessEventBus {
    subscribers: RwLock<Vec<Subscriber>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl InProcessEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every topic matching `pattern`.
    ///
    /// Must be called from within a tokio runtime. Messages published
    /// before the subscription are not replayed.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Validation`] for a malformed pattern and
    /// [`HubError::BusClosed`] after [`shutdown`](Self::shutdown).
    pub fn subscribe<H: EventHandler>(&self, pattern: &str, handler: H) -> Result<(), HubError> {
        let pattern = TopicPattern::new(pattern)?;
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::BusClosed);
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_subscriber(pattern.clone(), receiver, handler));

        tracing::debug!(%pattern, "subscriber registered");
        self.subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Subscriber { pattern, sender });
        self.workers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(worker);
        Ok(())
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Stop accepting publishes and wait until every queued delivery was handled.
    pub async fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // dropping the senders lets each worker exit once its queue is empty
        self.subscribers
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
        let workers = std::mem::take(
            &mut *self
                .workers
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        );
        for worker in workers {
            if let Err(err) = worker.await {
                tracing::error!(error = %err, "subscriber worker aborted");
            }
        }
        tracing::info!("event bus drained");
    }
}

async fn run_subscriber<H: EventHandler>(
    pattern: TopicPattern,
    mut receiver: mpsc::UnboundedReceiver<Delivery>,
    handler: H,
) {
    while let Some(delivery) = receiver.recv().await {
        let topic = delivery.topic.clone();
        let outcome = AssertUnwindSafe(async { handler.handle(delivery).await })
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!(%pattern, %topic, error = %err, "event handler failed");
            }
            Err(_) => {
                tracing::error!(%pattern, %topic, "event handler panicked");
            }
        }
    }
}

impl EventPublisher for InProcessEventBus {
    fn publish(&self, topic: Topic, message: BusMessage) -> Result<(), HubError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(HubError::BusClosed);
        }
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut delivered = 0_usize;
        for subscriber in subscribers.iter().filter(|s| s.pattern.matches(&topic)) {
            let delivery = Delivery {
                topic: topic.clone(),
                message: message.clone(),
            };
            // the receiver only goes away while shutting down
            if subscriber.sender.send(delivery).is_ok() {
                delivered += 1;
            }
        }
        tracing::trace!(%topic, delivered, "published");
        Ok(())
    }
}
