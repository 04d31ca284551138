//! In-memory repository implementations.
//!
//! These back the tests and the single-process deployment. Updates simulate
//! the store's atomic conditional write: the row's stored version must equal
//! the version the caller loaded, otherwise the update is rejected with
//! `Conflict` and nothing is written.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, NotificationId, OrderId, PaymentId};
use tokio::sync::RwLock;

use crate::error::DomainError;
use crate::notification::{Notification, NotificationStatus};
use crate::order::Order;
use crate::payment::{Payment, PaymentStatus};
use crate::repository::{NotificationRepository, OrderRepository, PaymentRepository};

/// In-memory order store.
#[derive(Clone, Default)]
pub struct InMemoryOrderRepository {
    rows: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns true if no orders are stored.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: Order) -> Result<Order, DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&order.id) {
            return Err(DomainError::Conflict {
                entity: "Order",
                id: order.id.to_string(),
                expected: 0,
                actual: order.version,
            });
        }
        rows.insert(order.id, order.clone());
        Ok(order)
    }

    async fn update(&self, mut order: Order) -> Result<Order, DomainError> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(&order.id)
            .ok_or_else(|| DomainError::not_found("Order", order.id))?;
        if current.version != order.version {
            return Err(DomainError::Conflict {
                entity: "Order",
                id: order.id.to_string(),
                expected: order.version,
                actual: current.version,
            });
        }
        order.version += 1;
        rows.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|o| o.order_number == order_number)
            .cloned())
    }

    async fn find_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, DomainError> {
        let mut orders: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|o| o.customer_id == customer_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.created_at);
        Ok(orders)
    }
}

/// In-memory payment store.
#[derive(Clone, Default)]
pub struct InMemoryPaymentRepository {
    rows: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payments.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns all stored payments, newest last.
    pub async fn all(&self) -> Vec<Payment> {
        let mut payments: Vec<_> = self.rows.read().await.values().cloned().collect();
        payments.sort_by_key(|p| p.created_at);
        payments
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: Payment) -> Result<Payment, DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&payment.id) {
            return Err(DomainError::Conflict {
                entity: "Payment",
                id: payment.id.to_string(),
                expected: 0,
                actual: payment.version,
            });
        }
        rows.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn update(&self, mut payment: Payment) -> Result<Payment, DomainError> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(&payment.id)
            .ok_or_else(|| DomainError::not_found("Payment", payment.id))?;
        if current.version != payment.version {
            return Err(DomainError::Conflict {
                entity: "Payment",
                id: payment.id.to_string(),
                expected: payment.version,
                actual: current.version,
            });
        }
        payment.version += 1;
        rows.insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, DomainError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<Payment>, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn find_retryable(&self, now: DateTime<Utc>) -> Result<Vec<Payment>, DomainError> {
        let mut payments: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|p| p.retry_due(now))
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.next_retry_at);
        Ok(payments)
    }

    async fn count_by_status(&self, status: PaymentStatus) -> Result<usize, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|p| p.status == status)
            .count())
    }
}

/// In-memory notification store.
#[derive(Clone, Default)]
pub struct InMemoryNotificationRepository {
    rows: Arc<RwLock<HashMap<NotificationId, Notification>>>,
}

impl InMemoryNotificationRepository {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored notifications.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Returns all stored notifications, oldest first.
    pub async fn all(&self) -> Vec<Notification> {
        let mut notifications: Vec<_> = self.rows.read().await.values().cloned().collect();
        notifications.sort_by_key(|n| n.created_at);
        notifications
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: Notification) -> Result<Notification, DomainError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&notification.id) {
            return Err(DomainError::Conflict {
                entity: "Notification",
                id: notification.id.to_string(),
                expected: 0,
                actual: notification.version,
            });
        }
        rows.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn update(&self, mut notification: Notification) -> Result<Notification, DomainError> {
        let mut rows = self.rows.write().await;
        let current = rows
            .get(&notification.id)
            .ok_or_else(|| DomainError::not_found("Notification", notification.id))?;
        if current.version != notification.version {
            return Err(DomainError::Conflict {
                entity: "Notification",
                id: notification.id.to_string(),
                expected: notification.version,
                actual: current.version,
            });
        }
        notification.version += 1;
        rows.insert(notification.id, notification.clone());
        Ok(notification)
    }

    async fn find_by_id(&self, id: NotificationId) -> Result<Option<Notification>, DomainError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn find_retryable(&self) -> Result<Vec<Notification>, DomainError> {
        let mut notifications: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.can_retry())
            .cloned()
            .collect();
        notifications.sort_by_key(|n| n.created_at);
        Ok(notifications)
    }

    async fn find_by_related_entity(
        &self,
        related_entity_id: &str,
    ) -> Result<Vec<Notification>, DomainError> {
        let mut notifications: Vec<_> = self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.related_entity_id == related_entity_id)
            .cloned()
            .collect();
        notifications.sort_by_key(|n| n.created_at);
        Ok(notifications)
    }

    async fn count_by_status(&self, status: NotificationStatus) -> Result<usize, DomainError> {
        Ok(self
            .rows
            .read()
            .await
            .values()
            .filter(|n| n.status == status)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::NotificationType;
    use crate::order::{CustomerContact, OrderItem};
    use crate::payment::PaymentMethod;
    use chrono::Duration;
    use common::Money;

    fn sample_order() -> Order {
        Order::new(
            CustomerId::new(),
            CustomerContact {
                name: "Jane Doe".to_string(),
                email: "jane@example.com".to_string(),
                phone: "+1-555-0100".to_string(),
            },
            "1 Main St",
            vec![OrderItem::new("SKU-1", "Widget", 1, Money::from_cents(1000))],
        )
    }

    fn sample_payment(order_id: OrderId) -> Payment {
        Payment::new(
            order_id,
            "ORD-1",
            CustomerId::new(),
            "Jane Doe",
            "jane@example.com",
            "+1-555-0100",
            Money::from_cents(1000),
            PaymentMethod::default(),
            3,
        )
    }

    #[tokio::test]
    async fn insert_and_find_order() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.insert(sample_order()).await.unwrap();

        let found = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(found.order_number, order.order_number);

        let by_number = repo
            .find_by_order_number(&order.order_number)
            .await
            .unwrap();
        assert!(by_number.is_some());
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.insert(sample_order()).await.unwrap();
        assert!(matches!(
            repo.insert(order).await,
            Err(DomainError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let repo = InMemoryOrderRepository::new();
        let mut order = repo.insert(sample_order()).await.unwrap();
        assert_eq!(order.version, 0);

        order.transition_to(crate::OrderStatus::PaymentPending).unwrap();
        let updated = repo.update(order).await.unwrap();
        assert_eq!(updated.version, 1);
    }

    #[tokio::test]
    async fn stale_update_is_rejected() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.insert(sample_order()).await.unwrap();

        // Two racers load the same version.
        let mut first = order.clone();
        let mut second = order;
        first.transition_to(crate::OrderStatus::PaymentPending).unwrap();
        second.transition_to(crate::OrderStatus::Cancelled).unwrap();

        repo.update(first).await.unwrap();
        let err = repo.update(second).await.unwrap_err();
        assert!(matches!(err, DomainError::Conflict { .. }));
    }

    #[tokio::test]
    async fn find_payment_by_order_id() {
        let repo = InMemoryPaymentRepository::new();
        let order_id = OrderId::new();
        repo.insert(sample_payment(order_id)).await.unwrap();

        assert!(repo.find_by_order_id(order_id).await.unwrap().is_some());
        assert!(repo.find_by_order_id(OrderId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retryable_payments_respect_window_and_attempts() {
        let repo = InMemoryPaymentRepository::new();

        let mut due = sample_payment(OrderId::new());
        due.begin_attempt().unwrap();
        due.fail("declined", Duration::minutes(5)).unwrap();
        let due = repo.insert(due).await.unwrap();

        let mut exhausted = sample_payment(OrderId::new());
        exhausted.retry_count = exhausted.max_retries;
        exhausted.begin_attempt().unwrap();
        exhausted.fail("declined", Duration::minutes(5)).unwrap();
        repo.insert(exhausted).await.unwrap();

        // Before the window opens nothing is due.
        assert!(repo.find_retryable(Utc::now()).await.unwrap().is_empty());

        let later = Utc::now() + Duration::minutes(10);
        let retryable = repo.find_retryable(later).await.unwrap();
        assert_eq!(retryable.len(), 1);
        assert_eq!(retryable[0].id, due.id);
    }

    #[tokio::test]
    async fn notification_queries() {
        let repo = InMemoryNotificationRepository::new();
        let mut failed = Notification::new(
            NotificationType::Email,
            "jane@example.com",
            None,
            "hi",
            "PAYMENT",
            "PAY-1",
            3,
        );
        failed.begin_sending().unwrap();
        failed.mark_failed("smtp down").unwrap();
        repo.insert(failed).await.unwrap();

        let sent = Notification::new(
            NotificationType::Sms,
            "+1-555-0100",
            None,
            "hi",
            "PAYMENT",
            "PAY-1",
            3,
        );
        repo.insert(sent).await.unwrap();

        assert_eq!(repo.find_retryable().await.unwrap().len(), 1);
        assert_eq!(repo.find_by_related_entity("PAY-1").await.unwrap().len(), 2);
        assert_eq!(
            repo.count_by_status(NotificationStatus::Failed).await.unwrap(),
            1
        );
    }
}
