//! Order entity and status state machine.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of an order in its lifecycle.
///
/// Transitions (terminal states: Delivered-after-refund window, Cancelled,
/// Refunded):
/// ```text
/// Created ──► PaymentPending ──► PaymentCompleted ──► Preparing ──► ReadyForDelivery
///    │              │                   │                │                │
///    │              ▼                   ▼                ▼                ▼
///    │        PaymentFailed        Refunded          Cancelled       InDelivery ──► Delivered ──► Refunded
///    └──► Cancelled   (retry ► PaymentPending)
/// ```
/// Created may also jump straight to a payment outcome: the payment consumer
/// races the PaymentPending bookkeeping update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Created,
    PaymentPending,
    PaymentCompleted,
    PaymentFailed,
    Preparing,
    ReadyForDelivery,
    InDelivery,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    /// Returns true if the move from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Created, PaymentPending)
                | (Created, PaymentCompleted)
                | (Created, PaymentFailed)
                | (Created, Cancelled)
                | (PaymentPending, PaymentCompleted)
                | (PaymentPending, PaymentFailed)
                | (PaymentPending, Cancelled)
                | (PaymentFailed, PaymentPending)
                | (PaymentFailed, PaymentCompleted)
                | (PaymentFailed, Cancelled)
                | (PaymentCompleted, Preparing)
                | (PaymentCompleted, Refunded)
                | (Preparing, ReadyForDelivery)
                | (Preparing, Cancelled)
                | (ReadyForDelivery, InDelivery)
                | (InDelivery, Delivered)
                | (Delivered, Refunded)
        )
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Refunded)
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Returns the status name as it appears on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Created => "CREATED",
            OrderStatus::PaymentPending => "PAYMENT_PENDING",
            OrderStatus::PaymentCompleted => "PAYMENT_COMPLETED",
            OrderStatus::PaymentFailed => "PAYMENT_FAILED",
            OrderStatus::Preparing => "PREPARING",
            OrderStatus::ReadyForDelivery => "READY_FOR_DELIVERY",
            OrderStatus::InDelivery => "IN_DELIVERY",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How to reach the customer for notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerContact {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// One line item on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

impl OrderItem {
    /// Creates an item, deriving its total price.
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            total_price: unit_price.multiply(quantity),
        }
    }
}

/// An order row. Owned by the Order Lifecycle Manager; status changes only
/// through [`transition_to`].
///
/// [`transition_to`]: Order::transition_to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: String,
    pub customer_id: CustomerId,
    pub contact: CustomerContact,
    pub delivery_address: String,
    pub items: Vec<OrderItem>,
    /// Derived from the items, never entered directly.
    pub total_amount: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency version, bumped by the repository on update.
    pub version: u64,
}

impl Order {
    /// Creates a new order in `Created` with a generated order number and a
    /// derived total.
    pub fn new(
        customer_id: CustomerId,
        contact: CustomerContact,
        delivery_address: impl Into<String>,
        items: Vec<OrderItem>,
    ) -> Self {
        let mut order = Self {
            id: OrderId::new(),
            order_number: generate_order_number(),
            customer_id,
            contact,
            delivery_address: delivery_address.into(),
            items,
            total_amount: Money::zero(),
            status: OrderStatus::Created,
            created_at: Utc::now(),
            completed_at: None,
            version: 0,
        };
        order.recompute_total();
        order
    }

    /// Recomputes `total_amount` from the items. Idempotent.
    pub fn recompute_total(&mut self) {
        self.total_amount = self.items.iter().map(|item| item.total_price).sum();
    }

    /// Moves the order to `next`, validating the state machine.
    ///
    /// Transitioning to `Delivered` stamps `completed_at`.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_transition(
                "Order",
                self.status,
                next,
            ));
        }
        self.status = next;
        if next == OrderStatus::Delivered {
            self.completed_at = Some(Utc::now());
        }
        Ok(())
    }
}

/// Generates a unique order number, e.g. `ORD-1700000000000-AB12CD34`.
pub fn generate_order_number() -> String {
    format!(
        "ORD-{}-{}",
        Utc::now().timestamp_millis(),
        &uuid::Uuid::new_v4().simple().to_string()[..8].to_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_contact() -> CustomerContact {
        CustomerContact {
            name: "Jane Doe".to_string(),
            email: "jane@example.com".to_string(),
            phone: "+1-555-0100".to_string(),
        }
    }

    fn sample_order() -> Order {
        Order::new(
            CustomerId::new(),
            sample_contact(),
            "1 Main St",
            vec![
                OrderItem::new("SKU-1", "Widget", 2, Money::from_cents(1000)),
                OrderItem::new("SKU-2", "Gadget", 1, Money::from_cents(500)),
            ],
        )
    }

    #[test]
    fn total_amount_is_derived_from_items() {
        let order = sample_order();
        assert_eq!(order.total_amount, Money::from_cents(2500));
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[test]
    fn recompute_total_is_idempotent() {
        let mut order = sample_order();
        order.recompute_total();
        order.recompute_total();
        assert_eq!(order.total_amount, Money::from_cents(2500));
    }

    #[test]
    fn recompute_after_item_mutation() {
        let mut order = sample_order();
        order.items.push(OrderItem::new("SKU-3", "Gizmo", 3, Money::from_cents(100)));
        order.recompute_total();
        assert_eq!(order.total_amount, Money::from_cents(2800));
    }

    #[test]
    fn order_numbers_are_unique_and_prefixed() {
        let a = generate_order_number();
        let b = generate_order_number();
        assert!(a.starts_with("ORD-"));
        assert_ne!(a, b);
    }

    #[test]
    fn created_cannot_jump_to_delivered() {
        let mut order = sample_order();
        let err = order.transition_to(OrderStatus::Delivered).unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));
        assert_eq!(order.status, OrderStatus::Created);
    }

    #[test]
    fn full_happy_path_transitions() {
        let mut order = sample_order();
        for status in [
            OrderStatus::PaymentPending,
            OrderStatus::PaymentCompleted,
            OrderStatus::Preparing,
            OrderStatus::ReadyForDelivery,
            OrderStatus::InDelivery,
            OrderStatus::Delivered,
        ] {
            order.transition_to(status).unwrap();
        }
        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.completed_at.is_some());
    }

    #[test]
    fn payment_failed_can_return_to_pending() {
        let mut order = sample_order();
        order.transition_to(OrderStatus::PaymentPending).unwrap();
        order.transition_to(OrderStatus::PaymentFailed).unwrap();
        order.transition_to(OrderStatus::PaymentPending).unwrap();
        assert_eq!(order.status, OrderStatus::PaymentPending);
    }

    #[test]
    fn terminal_states_reject_all_moves() {
        let mut order = sample_order();
        order.transition_to(OrderStatus::Cancelled).unwrap();
        assert!(order.status.is_terminal());
        assert!(order.transition_to(OrderStatus::PaymentPending).is_err());
    }

    #[test]
    fn delivered_allows_refund_only() {
        assert!(OrderStatus::Delivered.can_transition_to(OrderStatus::Refunded));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Cancelled));
        assert!(!OrderStatus::Delivered.is_terminal());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(OrderStatus::ReadyForDelivery.as_str(), "READY_FOR_DELIVERY");
        let json = serde_json::to_string(&OrderStatus::PaymentPending).unwrap();
        assert_eq!(json, "\"PAYMENT_PENDING\"");
    }
}
