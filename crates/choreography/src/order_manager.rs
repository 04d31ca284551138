//! Order lifecycle manager.
//!
//! Owns order rows: validates and persists new orders, guards status
//! transitions, and publishes the order events other services react to. It
//! also consumes payment outcome events to move orders through the payment
//! stages of the state machine.

use std::sync::Arc;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId};
use domain::{
    CustomerContact, DomainError, Order, OrderItem, OrderRepository, OrderStatus,
};
use event_bus::{
    BusMessage, Envelope, EventBus, EventHandler, EventPayload, EventType, HandlerError,
    OrderItemPayload, OrderPayload, ProcessedEvents, Topic,
};

/// Service name stamped on published envelopes.
const SOURCE: &str = "order-service";

/// One requested line item.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A new-order request as received from the API.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub contact: CustomerContact,
    pub delivery_address: String,
    pub items: Vec<NewOrderItem>,
}

/// Owns the order rows and the order topics.
pub struct OrderLifecycleManager {
    repo: Arc<dyn OrderRepository>,
    bus: Arc<dyn EventBus>,
    processed: ProcessedEvents,
}

impl OrderLifecycleManager {
    pub fn new(repo: Arc<dyn OrderRepository>, bus: Arc<dyn EventBus>) -> Self {
        Self {
            repo,
            bus,
            processed: ProcessedEvents::new(),
        }
    }

    /// Topics this manager consumes: payment outcomes drive the order's
    /// payment stages.
    pub fn topics() -> Vec<Topic> {
        vec![Topic::PaymentCompleted, Topic::PaymentFailed]
    }

    /// Validates and persists a new order, then publishes `ORDER_CREATED`.
    ///
    /// The publish is fire-and-forget: a bus failure is logged and counted
    /// but never rolls back the persisted order.
    #[tracing::instrument(skip(self, request), fields(customer_id = %request.customer_id))]
    pub async fn create_order(&self, request: NewOrder) -> Result<Order, DomainError> {
        validate(&request)?;

        let items = request
            .items
            .into_iter()
            .map(|item| OrderItem::new(item.product_id, item.product_name, item.quantity, item.unit_price))
            .collect();
        let order = Order::new(
            request.customer_id,
            request.contact,
            request.delivery_address,
            items,
        );
        let order = self.repo.insert(order).await?;

        tracing::info!(
            order_number = %order.order_number,
            total_amount = %order.total_amount,
            "order created"
        );
        metrics::counter!("orders_created_total").increment(1);
        self.publish_event(EventType::OrderCreated, &order).await;
        Ok(order)
    }

    /// Moves an order to `next`, enforcing the state machine, and publishes
    /// `ORDER_UPDATED`.
    #[tracing::instrument(skip(self), fields(order_id = %id, next = %next))]
    pub async fn update_status(
        &self,
        id: OrderId,
        next: OrderStatus,
    ) -> Result<Order, DomainError> {
        let mut order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;
        order.transition_to(next)?;
        let order = self.repo.update(order).await?;

        tracing::info!(order_number = %order.order_number, status = %order.status, "order status updated");
        self.publish_event(EventType::OrderUpdated, &order).await;
        Ok(order)
    }

    /// Cancels an order if its status still allows it, and publishes
    /// `ORDER_CANCELLED`.
    #[tracing::instrument(skip(self), fields(order_id = %id))]
    pub async fn cancel_order(&self, id: OrderId) -> Result<Order, DomainError> {
        let mut order = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Order", id))?;
        order.transition_to(OrderStatus::Cancelled)?;
        let order = self.repo.update(order).await?;

        tracing::info!(order_number = %order.order_number, "order cancelled");
        metrics::counter!("orders_cancelled_total").increment(1);
        self.publish_event(EventType::OrderCancelled, &order).await;
        Ok(order)
    }

    pub async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        self.repo.find_by_id(id).await
    }

    pub async fn find_by_order_number(
        &self,
        order_number: &str,
    ) -> Result<Option<Order>, DomainError> {
        self.repo.find_by_order_number(order_number).await
    }

    pub async fn find_by_customer(
        &self,
        customer_id: CustomerId,
    ) -> Result<Vec<Order>, DomainError> {
        self.repo.find_by_customer(customer_id).await
    }

    async fn publish_event(&self, event_type: EventType, order: &Order) {
        let envelope = Envelope::new(event_type, SOURCE, order_payload(order));
        if let Err(error) = self
            .bus
            .publish(envelope.topic(), &order.order_number, &envelope)
            .await
        {
            tracing::error!(
                order_number = %order.order_number,
                event_type = %event_type,
                %error,
                "failed to publish order event"
            );
            metrics::counter!("order_event_publish_failures_total").increment(1);
        }
    }
}

/// Builds the wire payload for an order event.
pub fn order_payload(order: &Order) -> EventPayload {
    EventPayload::Order(OrderPayload {
        order_id: order.id,
        order_number: order.order_number.clone(),
        customer_id: order.customer_id,
        customer_name: order.contact.name.clone(),
        customer_email: order.contact.email.clone(),
        customer_phone: order.contact.phone.clone(),
        delivery_address: order.delivery_address.clone(),
        total_amount: order.total_amount,
        status: order.status.to_string(),
        items: order
            .items
            .iter()
            .map(|item| OrderItemPayload {
                product_id: item.product_id.clone(),
                product_name: item.product_name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
            })
            .collect(),
    })
}

fn validate(request: &NewOrder) -> Result<(), DomainError> {
    if request.items.is_empty() {
        return Err(DomainError::Validation(
            "order must contain at least one item".to_string(),
        ));
    }
    if request.items.iter().any(|item| item.quantity == 0) {
        return Err(DomainError::Validation(
            "item quantity must be at least 1".to_string(),
        ));
    }
    if request.contact.name.trim().is_empty() || request.contact.email.trim().is_empty() {
        return Err(DomainError::Validation(
            "customer name and email are required".to_string(),
        ));
    }
    if request.delivery_address.trim().is_empty() {
        return Err(DomainError::Validation(
            "delivery address is required".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl EventHandler for OrderLifecycleManager {
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError> {
        let envelope = message
            .envelope()
            .map_err(|e| HandlerError::DeadLetter(format!("malformed payment event: {e}")))?;
        // The id is marked processed only once the work completes, so a
        // Retry verdict leaves the redelivery effective.
        if self.processed.contains(envelope.event_id).await {
            return Ok(());
        }

        let EventPayload::Payment(payment) = &envelope.payload else {
            return Err(HandlerError::DeadLetter(format!(
                "unexpected payload domain on {}",
                message.topic
            )));
        };
        let next = match envelope.event_type {
            EventType::PaymentCompleted => OrderStatus::PaymentCompleted,
            EventType::PaymentFailed => OrderStatus::PaymentFailed,
            other => {
                tracing::debug!(event_type = %other, "ignoring payment event");
                self.processed.mark_processed(envelope.event_id).await;
                return Ok(());
            }
        };

        let Some(mut order) = self
            .repo
            .find_by_id(payment.order_id)
            .await
            .map_err(|e| HandlerError::Retry(e.to_string()))?
        else {
            return Err(HandlerError::DeadLetter(format!(
                "payment event for unknown order {}",
                payment.order_number
            )));
        };

        if order.status == next {
            self.processed.mark_processed(envelope.event_id).await;
            return Ok(());
        }
        if let Err(error) = order.transition_to(next) {
            // A replayed or late outcome for an order that already moved on.
            tracing::warn!(
                order_number = %order.order_number,
                %error,
                "dropping stale payment outcome"
            );
            self.processed.mark_processed(envelope.event_id).await;
            return Ok(());
        }
        match self.repo.update(order.clone()).await {
            Ok(order) => {
                tracing::info!(order_number = %order.order_number, status = %order.status, "order advanced by payment outcome");
                self.publish_event(EventType::OrderUpdated, &order).await;
                self.processed.mark_processed(envelope.event_id).await;
                Ok(())
            }
            Err(DomainError::Conflict { .. }) => {
                Err(HandlerError::Retry("lost order update race".to_string()))
            }
            Err(error) => Err(HandlerError::Retry(error.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::InMemoryOrderRepository;
    use event_bus::{Domain, InMemoryEventBus, PaymentPayload};
    use tokio::sync::Mutex;

    /// Order store whose next `update` calls lose the version race.
    struct ContendedOrderRepository {
        inner: InMemoryOrderRepository,
        conflicts: Mutex<u32>,
    }

    impl ContendedOrderRepository {
        fn new(conflicts: u32) -> Self {
            Self {
                inner: InMemoryOrderRepository::new(),
                conflicts: Mutex::new(conflicts),
            }
        }
    }

    #[async_trait]
    impl OrderRepository for ContendedOrderRepository {
        async fn insert(&self, order: Order) -> Result<Order, DomainError> {
            self.inner.insert(order).await
        }

        async fn update(&self, order: Order) -> Result<Order, DomainError> {
            let mut conflicts = self.conflicts.lock().await;
            if *conflicts > 0 {
                *conflicts -= 1;
                return Err(DomainError::Conflict {
                    entity: "Order",
                    id: order.id.to_string(),
                    expected: order.version,
                    actual: order.version + 1,
                });
            }
            drop(conflicts);
            self.inner.update(order).await
        }

        async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
            self.inner.find_by_id(id).await
        }

        async fn find_by_order_number(
            &self,
            order_number: &str,
        ) -> Result<Option<Order>, DomainError> {
            self.inner.find_by_order_number(order_number).await
        }

        async fn find_by_customer(
            &self,
            customer_id: CustomerId,
        ) -> Result<Vec<Order>, DomainError> {
            self.inner.find_by_customer(customer_id).await
        }
    }

    fn payment_completed(order: &Order) -> Envelope {
        Envelope::new(
            EventType::PaymentCompleted,
            "payment-service",
            EventPayload::Payment(PaymentPayload {
                payment_id: common::PaymentId::new(),
                payment_number: "PAY-1".to_string(),
                order_id: order.id,
                order_number: order.order_number.clone(),
                customer_id: order.customer_id,
                customer_name: order.contact.name.clone(),
                customer_email: order.contact.email.clone(),
                customer_phone: order.contact.phone.clone(),
                amount: order.total_amount,
                status: "COMPLETED".to_string(),
                transaction_id: Some("TXN-1".to_string()),
                failure_reason: None,
            }),
        )
    }

    fn sample_request() -> NewOrder {
        NewOrder {
            customer_id: CustomerId::new(),
            contact: CustomerContact {
                name: "Jane Doe".to_string(),
                email: "jane@example.com".to_string(),
                phone: "+1-555-0100".to_string(),
            },
            delivery_address: "1 Main St".to_string(),
            items: vec![NewOrderItem {
                product_id: "SKU-1".to_string(),
                product_name: "Widget".to_string(),
                quantity: 2,
                unit_price: Money::from_cents(1250),
            }],
        }
    }

    fn manager() -> (OrderLifecycleManager, Arc<InMemoryEventBus>) {
        let bus = Arc::new(InMemoryEventBus::new());
        let repo = Arc::new(InMemoryOrderRepository::new());
        (OrderLifecycleManager::new(repo, bus.clone()), bus)
    }

    #[tokio::test]
    async fn create_order_persists_and_publishes_one_envelope() {
        let (manager, bus) = manager();
        let order = manager.create_order(sample_request()).await.unwrap();

        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(order.total_amount, Money::from_cents(2500));

        let envelopes = bus.envelopes_on(Topic::OrderCreated).await;
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].event_type, EventType::OrderCreated);
        let EventPayload::Order(payload) = &envelopes[0].payload else {
            panic!("expected order payload");
        };
        assert_eq!(payload.order_number, order.order_number);
        assert_eq!(payload.total_amount, Money::from_cents(2500));
        assert_eq!(payload.items.len(), 1);

        let by_number = manager
            .find_by_order_number(&order.order_number)
            .await
            .unwrap();
        assert_eq!(by_number.unwrap().id, order.id);
    }

    #[tokio::test]
    async fn empty_order_is_rejected_without_side_effects() {
        let (manager, bus) = manager();
        let mut request = sample_request();
        request.items.clear();

        let err = manager.create_order(request).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(bus.published_count().await, 0);
    }

    #[tokio::test]
    async fn zero_quantity_item_is_rejected() {
        let (manager, _) = manager();
        let mut request = sample_request();
        request.items[0].quantity = 0;
        assert!(manager.create_order(request).await.is_err());
    }

    #[tokio::test]
    async fn update_status_enforces_state_machine() {
        let (manager, bus) = manager();
        let order = manager.create_order(sample_request()).await.unwrap();

        let err = manager
            .update_status(order.id, OrderStatus::Delivered)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidTransition { .. }));

        let updated = manager
            .update_status(order.id, OrderStatus::PaymentPending)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::PaymentPending);
        assert_eq!(bus.envelopes_on(Topic::OrderUpdated).await.len(), 1);
    }

    #[tokio::test]
    async fn update_unknown_order_is_not_found() {
        let (manager, _) = manager();
        let err = manager
            .update_status(OrderId::new(), OrderStatus::PaymentPending)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound { .. }));
    }

    #[tokio::test]
    async fn cancel_publishes_order_cancelled() {
        let (manager, bus) = manager();
        let order = manager.create_order(sample_request()).await.unwrap();

        let cancelled = manager.cancel_order(order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert_eq!(bus.envelopes_on(Topic::OrderCancelled).await.len(), 1);

        // Terminal: a second cancel is an invalid transition.
        assert!(manager.cancel_order(order.id).await.is_err());
    }

    #[tokio::test]
    async fn lost_update_race_is_recovered_on_redelivery() {
        let bus = Arc::new(InMemoryEventBus::new());
        let repo = Arc::new(ContendedOrderRepository::new(1));
        let manager = Arc::new(OrderLifecycleManager::new(repo, bus.clone()));
        bus.subscribe(
            OrderLifecycleManager::topics(),
            "order-service",
            manager.clone(),
        )
        .await
        .unwrap();

        let order = manager.create_order(sample_request()).await.unwrap();
        bus.publish(
            Topic::PaymentCompleted,
            &order.order_number,
            &payment_completed(&order),
        )
        .await
        .unwrap();
        bus.drain().await;

        // The first delivery lost the version race; the redelivery must
        // still advance the order instead of being swallowed as a duplicate.
        let order = manager.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PaymentCompleted);
        assert!(
            bus.published_to(Topic::DeadLetter(Domain::Payment))
                .await
                .is_empty()
        );
    }

    #[tokio::test]
    async fn exhausted_update_races_dead_letter_the_outcome() {
        let bus = Arc::new(InMemoryEventBus::new());
        let repo = Arc::new(ContendedOrderRepository::new(u32::MAX));
        let manager = Arc::new(OrderLifecycleManager::new(repo, bus.clone()));
        bus.subscribe(
            OrderLifecycleManager::topics(),
            "order-service",
            manager.clone(),
        )
        .await
        .unwrap();

        let order = manager.create_order(sample_request()).await.unwrap();
        bus.publish(
            Topic::PaymentCompleted,
            &order.order_number,
            &payment_completed(&order),
        )
        .await
        .unwrap();
        bus.drain().await;

        let order = manager.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Created);
        assert_eq!(
            bus.published_to(Topic::DeadLetter(Domain::Payment))
                .await
                .len(),
            1
        );
    }
}
