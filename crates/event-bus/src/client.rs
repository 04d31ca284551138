//! Producer and consumer contracts for the event bus.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::Envelope;
use crate::error::BusError;
use crate::topic::Topic;

/// A raw message as delivered by the bus: the topic it arrived on, its
/// partition key and the serialized envelope.
///
/// Handlers receive the raw wire form so that deserialization failures are
/// theirs to classify (a domain consumer dead-letters a malformed payload;
/// the monitoring consumer logs it and acknowledges).
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub topic: Topic,
    pub key: String,
    pub payload: String,
}

impl BusMessage {
    /// Parses the payload as an [`Envelope`].
    pub fn envelope(&self) -> Result<Envelope, serde_json::Error> {
        Envelope::from_json(&self.payload)
    }
}

/// A handler's verdict on a message it could not process.
///
/// The verdict controls acknowledgment: `Retry` leaves the message
/// unacknowledged for redelivery (bounded, then dead-lettered), while
/// `DeadLetter` skips redelivery and routes the message straight to the
/// domain's dead-letter topic.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Transient failure; the message will be redelivered.
    #[error("retryable handler failure: {0}")]
    Retry(String),

    /// Permanent failure (e.g. malformed payload); dead-letter immediately.
    #[error("dead-lettered: {0}")]
    DeadLetter(String),
}

/// A consumer of bus messages.
///
/// Delivery is at-least-once: the same message may arrive more than once,
/// so implementations must be idempotent (dedupe on the envelope's
/// `event_id`, see [`crate::ProcessedEvents`]).
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Processes one message. Returning `Ok` acknowledges it; any error
    /// leaves it unacknowledged per the [`HandlerError`] verdict.
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError>;
}

/// Pub/sub client contract.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a pre-serialized payload. Fire-and-forget from the
    /// caller's perspective: the message is accepted for delivery, not
    /// delivered synchronously.
    async fn publish_raw(&self, topic: Topic, key: &str, payload: String) -> Result<(), BusError>;

    /// Serializes and publishes an envelope, keyed so that all events for
    /// one entity land on the same partition (per-key ordering).
    async fn publish(&self, topic: Topic, key: &str, envelope: &Envelope) -> Result<(), BusError> {
        let payload = envelope.to_json()?;
        self.publish_raw(topic, key, payload).await
    }

    /// Registers a handler for a set of topics under a consumer group.
    ///
    /// Groups are independent: every group receives its own copy of each
    /// message, while within a group each message is delivered once.
    async fn subscribe(
        &self,
        topics: Vec<Topic>,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BusError>;
}
