//! Topic names. These are part of the compatibility surface: external
//! consumers match on the exact strings.

use serde::{Deserialize, Serialize};

/// The domain a topic belongs to. Each domain has its own dead-letter topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Order,
    Payment,
    Delivery,
    Notification,
}

impl Domain {
    /// Returns the domain name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Order => "order",
            Domain::Payment => "payment",
            Domain::Delivery => "delivery",
            Domain::Notification => "notification",
        }
    }

    /// Returns the dead-letter topic for this domain.
    pub fn dead_letter_topic(&self) -> Topic {
        Topic::DeadLetter(*self)
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named bus topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
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
    NotificationSend,
    NotificationSent,
    NotificationFailed,
    DeadLetter(Domain),
}

impl Topic {
    /// Returns the topic name on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::OrderCreated => "order.created",
            Topic::OrderUpdated => "order.updated",
            Topic::OrderCancelled => "order.cancelled",
            Topic::PaymentInitiated => "payment.initiated",
            Topic::PaymentProcessing => "payment.processing",
            Topic::PaymentCompleted => "payment.completed",
            Topic::PaymentFailed => "payment.failed",
            Topic::PaymentRefunded => "payment.refunded",
            Topic::DeliveryAssigned => "delivery.assigned",
            Topic::DeliveryPickedUp => "delivery.picked-up",
            Topic::DeliveryInTransit => "delivery.in-transit",
            Topic::DeliveryArriving => "delivery.arriving",
            Topic::DeliveryCompleted => "delivery.completed",
            Topic::DeliveryFailed => "delivery.failed",
            Topic::NotificationSend => "notification.send",
            Topic::NotificationSent => "notification.sent",
            Topic::NotificationFailed => "notification.failed",
            Topic::DeadLetter(Domain::Order) => "dlt.order",
            Topic::DeadLetter(Domain::Payment) => "dlt.payment",
            Topic::DeadLetter(Domain::Delivery) => "dlt.delivery",
            Topic::DeadLetter(Domain::Notification) => "dlt.notification",
        }
    }

    /// Returns the domain that owns this topic.
    pub fn domain(&self) -> Domain {
        match self {
            Topic::OrderCreated | Topic::OrderUpdated | Topic::OrderCancelled => Domain::Order,
            Topic::PaymentInitiated
            | Topic::PaymentProcessing
            | Topic::PaymentCompleted
            | Topic::PaymentFailed
            | Topic::PaymentRefunded => Domain::Payment,
            Topic::DeliveryAssigned
            | Topic::DeliveryPickedUp
            | Topic::DeliveryInTransit
            | Topic::DeliveryArriving
            | Topic::DeliveryCompleted
            | Topic::DeliveryFailed => Domain::Delivery,
            Topic::NotificationSend | Topic::NotificationSent | Topic::NotificationFailed => {
                Domain::Notification
            }
            Topic::DeadLetter(domain) => *domain,
        }
    }

    /// Returns true if this is a dead-letter topic.
    pub fn is_dead_letter(&self) -> bool {
        matches!(self, Topic::DeadLetter(_))
    }

    /// All regular (non-dead-letter) domain topics, in declaration order.
    ///
    /// The monitoring aggregator subscribes to every one of these.
    pub fn all_domain_topics() -> &'static [Topic] {
        &[
            Topic::OrderCreated,
            Topic::OrderUpdated,
            Topic::OrderCancelled,
            Topic::PaymentInitiated,
            Topic::PaymentProcessing,
            Topic::PaymentCompleted,
            Topic::PaymentFailed,
            Topic::PaymentRefunded,
            Topic::DeliveryAssigned,
            Topic::DeliveryPickedUp,
            Topic::DeliveryInTransit,
            Topic::DeliveryArriving,
            Topic::DeliveryCompleted,
            Topic::DeliveryFailed,
            Topic::NotificationSend,
            Topic::NotificationSent,
            Topic::NotificationFailed,
        ]
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
