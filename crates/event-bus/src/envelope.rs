//! The wire-level event envelope and its typed payloads.
//!
//! One shared envelope carries the metadata every event needs plus a tagged
//! union over the four domain payload shapes. On the wire this is a single
//! flat JSON object: the metadata fields, a `domain` discriminator, and the
//! domain-specific fields.

use chrono::{DateTime, Utc};
use common::{CustomerId, EventId, Money, NotificationId, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::topic::Topic;

/// Wire envelope format version.
pub const ENVELOPE_VERSION: u32 = 1;

/// The type of a domain event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    OrderCreated,
    OrderUpdated,
    OrderCancelled,
    PaymentInitiated,
    PaymentProcessing,
    PaymentCompleted,
    PaymentFailed,
    PaymentRefunded,
    DeliveryAssigned,
    DeliveryPickedUp,
    DeliveryInTransit,
    DeliveryArriving,
    DeliveryCompleted,
    DeliveryFailed,
    NotificationSent,
    NotificationFailed,
}

impl EventType {
    /// Returns the topic this event type is published on.
    pub fn topic(&self) -> Topic {
        match self {
            EventType::OrderCreated => Topic::OrderCreated,
            EventType::OrderUpdated => Topic::OrderUpdated,
            EventType::OrderCancelled => Topic::OrderCancelled,
            EventType::PaymentInitiated => Topic::PaymentInitiated,
            EventType::PaymentProcessing => Topic::PaymentProcessing,
            EventType::PaymentCompleted => Topic::PaymentCompleted,
            EventType::PaymentFailed => Topic::PaymentFailed,
            EventType::PaymentRefunded => Topic::PaymentRefunded,
            EventType::DeliveryAssigned => Topic::DeliveryAssigned,
            EventType::DeliveryPickedUp => Topic::DeliveryPickedUp,
            EventType::DeliveryInTransit => Topic::DeliveryInTransit,
            EventType::DeliveryArriving => Topic::DeliveryArriving,
            EventType::DeliveryCompleted => Topic::DeliveryCompleted,
            EventType::DeliveryFailed => Topic::DeliveryFailed,
            EventType::NotificationSent => Topic::NotificationSent,
            EventType::NotificationFailed => Topic::NotificationFailed,
        }
    }

    /// Returns the event type name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::OrderCreated => "ORDER_CREATED",
            EventType::OrderUpdated => "ORDER_UPDATED",
            EventType::OrderCancelled => "ORDER_CANCELLED",
            EventType::PaymentInitiated => "PAYMENT_INITIATED",
            EventType::PaymentProcessing => "PAYMENT_PROCESSING",
            EventType::PaymentCompleted => "PAYMENT_COMPLETED",
            EventType::PaymentFailed => "PAYMENT_FAILED",
            EventType::PaymentRefunded => "PAYMENT_REFUNDED",
            EventType::DeliveryAssigned => "DELIVERY_ASSIGNED",
            EventType::DeliveryPickedUp => "DELIVERY_PICKED_UP",
            EventType::DeliveryInTransit => "DELIVERY_IN_TRANSIT",
            EventType::DeliveryArriving => "DELIVERY_ARRIVING",
            EventType::DeliveryCompleted => "DELIVERY_COMPLETED",
            EventType::DeliveryFailed => "DELIVERY_FAILED",
            EventType::NotificationSent => "NOTIFICATION_SENT",
            EventType::NotificationFailed => "NOTIFICATION_FAILED",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line item inside an order payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemPayload {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// Domain fields for order events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub delivery_address: String,
    pub total_amount: Money,
    pub status: String,
    #[serde(default)]
    pub items: Vec<OrderItemPayload>,
}

/// Domain fields for payment events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentPayload {
    pub payment_id: PaymentId,
    pub payment_number: String,
    pub order_id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: String,
    pub amount: Money,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// Domain fields for delivery events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryPayload {
    pub delivery_number: String,
    pub order_number: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub customer_email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery_time: Option<String>,
}

/// Domain fields for notification lifecycle events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub notification_id: NotificationId,
    pub notification_type: String,
    pub recipient: String,
    pub related_entity_type: String,
    pub related_entity_id: String,
    pub status: String,
}

/// Tagged union over the four domain payload shapes.
///
/// Serialized internally tagged: the variant's fields sit beside a `domain`
/// discriminator in the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "domain", rename_all = "lowercase")]
pub enum EventPayload {
    Order(OrderPayload),
    Payment(PaymentPayload),
    Delivery(DeliveryPayload),
    Notification(NotificationPayload),
}

/// The wire-level wrapper carrying event metadata and a typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Globally unique id; the idempotency key for consumers.
    pub event_id: EventId,
    pub event_type: EventType,
    /// ISO-8601 timestamp of when the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Name of the service that emitted the event.
    pub source: String,
    /// Envelope format version.
    pub version: u32,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Envelope {
    /// Creates a new envelope with a fresh event id and the current time.
    pub fn new(event_type: EventType, source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            event_id: EventId::new(),
            event_type,
            timestamp: Utc::now(),
            source: source.into(),
            version: ENVELOPE_VERSION,
            payload,
        }
    }

    /// Returns the topic this envelope should be published on.
    pub fn topic(&self) -> Topic {
        self.event_type.topic()
    }

    /// Serializes the envelope to its JSON wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses an envelope from its JSON wire form.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
