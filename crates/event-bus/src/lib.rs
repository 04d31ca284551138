//! Event envelope wire format and pub/sub primitives.
//!
//! Every service in the choreography exchanges JSON-serialized [`Envelope`]s
//! over named topics. Delivery is at-least-once: a handler that fails leaves
//! the message unacknowledged and it will be redelivered, so consumers must
//! be idempotent (see [`ProcessedEvents`]). Messages that exhaust in-handler
//! retries are routed to the owning domain's dead-letter topic.

pub mod client;
pub mod dedupe;
pub mod envelope;
pub mod error;
pub mod memory;
pub mod topic;

pub use client::{BusMessage, EventBus, EventHandler, HandlerError};
pub use dedupe::ProcessedEvents;
pub use envelope::{
    DeliveryPayload, Envelope, EventPayload, EventType, NotificationPayload, OrderItemPayload,
    OrderPayload, PaymentPayload,
};
pub use error::BusError;
pub use memory::InMemoryEventBus;
pub use topic::{Domain, Topic};

/// Convenience type alias for bus results.
pub type Result<T> = std::result::Result<T, BusError>;
