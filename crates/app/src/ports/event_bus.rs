//! Event bus port: topic-addressed publish/subscribe.

use std::future::Future;

use homebus_domain::bus::BusMessage;
use homebus_domain::error::HubError;
use homebus_domain::topic::Topic;

/// Publishes payloads to every subscriber whose pattern matches the topic.
///
/// Publishing only enqueues; it never waits for handlers to run.
pub trait EventPublisher: Send + Sync {
    /// Publish a message on `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::BusClosed`] once the bus started shutting down.
    fn publish(&self, topic: Topic, message: BusMessage) -> Result<(), HubError>;
}

impl<T: EventPublisher + ?Sized> EventPublisher for std::sync::Arc<T> {
    fn publish(&self, topic: Topic, message: BusMessage) -> Result<(), HubError> {
        (**self).publish(topic, message)
    }
}

/// One message as seen by a subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: Topic,
    pub message: BusMessage,
}

/// Subscriber callback.
///
/// Errors and panics are caught and logged by the bus; they never reach the
/// publisher or other subscribers.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(&self, delivery: Delivery) -> impl Future<Output = Result<(), HubError>> + Send;
}

impl<F, Fut> EventHandler for F
where
    F: Fn(Delivery) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HubError>> + Send,
{
    fn handle(&self, delivery: Delivery) -> impl Future<Output = Result<(), HubError>> + Send {
        self(delivery)
    }
}
