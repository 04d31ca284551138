//! Repository traits for the transactional record store.
//!
//! Persistence mechanics are out of scope; these traits capture what the
//! choreography needs from a store: lookup by primary key, the secondary
//! indexes the consumers and schedulers query, and version-checked updates
//! so racing writers (a retry sweep and a duplicate event) cannot lose
//! updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, NotificationId, OrderId, PaymentId};

use crate::error::DomainError;
use crate::notification::{Notification, NotificationStatus};
use crate::order::Order;
use crate::payment::{Payment, PaymentStatus};

/// Store for order rows.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order. Fails with `Conflict` if the id already exists.
    async fn insert(&self, order: Order) -> Result<Order, DomainError>;

    /// Updates an order using its loaded `version` as the optimistic
    /// concurrency check. Returns the stored row with the bumped version.
    async fn update(&self, order: Order) -> Result<Order, DomainError>;

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError>;

    async fn find_by_order_number(&self, order_number: &str) -> Result<Option<Order>, DomainError>;

    async fn find_by_customer(&self, customer_id: CustomerId) -> Result<Vec<Order>, DomainError>;
}

/// Store for payment rows.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<Payment, DomainError>;

    /// Version-checked update, as [`OrderRepository::update`].
    async fn update(&self, payment: Payment) -> Result<Payment, DomainError>;

    async fn find_by_id(&self, id: PaymentId) -> Result<Option<Payment>, DomainError>;

    /// At most one payment exists per order; this is the duplicate-delivery
    /// check for `ORDER_CREATED`.
    async fn find_by_order_id(&self, order_id: OrderId) -> Result<Option<Payment>, DomainError>;

    /// Failed payments whose retry window has opened and that still have
    /// attempts remaining.
    async fn find_retryable(&self, now: DateTime<Utc>) -> Result<Vec<Payment>, DomainError>;

    async fn count_by_status(&self, status: PaymentStatus) -> Result<usize, DomainError>;
}

/// Store for notification rows.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: Notification) -> Result<Notification, DomainError>;

    /// Version-checked update, as [`OrderRepository::update`].
    async fn update(&self, notification: Notification) -> Result<Notification, DomainError>;

    async fn find_by_id(&self, id: NotificationId) -> Result<Option<Notification>, DomainError>;

    /// Failed notifications with attempts remaining.
    async fn find_retryable(&self) -> Result<Vec<Notification>, DomainError>;

    async fn find_by_related_entity(
        &self,
        related_entity_id: &str,
    ) -> Result<Vec<Notification>, DomainError>;

    async fn count_by_status(&self, status: NotificationStatus) -> Result<usize, DomainError>;
}
