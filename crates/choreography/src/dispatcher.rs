//! Notification dispatcher.
//!
//! Consumes domain events, maps each to zero or more channel sends, and
//! tracks per-notification delivery state. Channel sends for one event are
//! independent units of work: one channel failing never aborts its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{DomainError, Notification, NotificationRepository, NotificationType};
use event_bus::{
    BusMessage, DeliveryPayload, Envelope, EventBus, EventHandler, EventPayload, EventType,
    HandlerError, NotificationPayload, OrderPayload, PaymentPayload, ProcessedEvents, Topic,
};

use crate::channels::NotificationChannel;
use crate::worker::WorkerPool;

/// Service name stamped on published envelopes.
const SOURCE: &str = "notification-service";

/// Substituted for any template field the event did not carry.
const MISSING_FIELD: &str = "N/A";

/// One channel send planned from an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedSend {
    pub notification_type: NotificationType,
    pub recipient: String,
    pub subject: Option<String>,
    pub message: String,
    pub related_entity_type: &'static str,
    pub related_entity_id: String,
}

/// Owns the notification rows and the notification topics.
pub struct NotificationDispatcher {
    repo: Arc<dyn NotificationRepository>,
    bus: Arc<dyn EventBus>,
    channels: HashMap<NotificationType, Arc<dyn NotificationChannel>>,
    workers: WorkerPool,
    processed: ProcessedEvents,
    max_retries: u32,
    send_timeout: std::time::Duration,
}

impl NotificationDispatcher {
    pub fn new(
        repo: Arc<dyn NotificationRepository>,
        bus: Arc<dyn EventBus>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        workers: WorkerPool,
        max_retries: u32,
    ) -> Self {
        Self {
            repo,
            bus,
            channels: channels
                .into_iter()
                .map(|channel| (channel.channel_type(), channel))
                .collect(),
            workers,
            processed: ProcessedEvents::new(),
            max_retries,
            send_timeout: std::time::Duration::from_secs(10),
        }
    }

    /// Topics this dispatcher consumes.
    pub fn topics() -> Vec<Topic> {
        vec![
            Topic::OrderCreated,
            Topic::OrderCancelled,
            Topic::PaymentCompleted,
            Topic::PaymentFailed,
            Topic::DeliveryAssigned,
            Topic::DeliveryInTransit,
            Topic::DeliveryCompleted,
        ]
    }

    /// Re-drives a failed notification. Only legal while `can_retry()`
    /// holds; the retry counts against `max_retries`.
    #[tracing::instrument(skip(self), fields(notification_id = %id))]
    pub async fn retry_notification(
        &self,
        id: common::NotificationId,
    ) -> Result<Notification, DomainError> {
        let mut notification = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("Notification", id))?;
        notification.begin_retry()?;
        let notification = self.repo.update(notification).await?;

        tracing::info!(
            notification_id = %notification.id,
            channel = %notification.notification_type,
            attempt = notification.retry_count,
            "retrying notification"
        );
        metrics::counter!("notification_retries_total").increment(1);
        self.send(notification).await
    }

    async fn dispatch(&self, planned: PlannedSend) -> Result<Notification, DomainError> {
        let notification = Notification::new(
            planned.notification_type,
            planned.recipient,
            planned.subject,
            planned.message,
            planned.related_entity_type,
            planned.related_entity_id,
            self.max_retries,
        );
        let notification = self.repo.insert(notification).await?;
        self.send(notification).await
    }

    /// Runs one channel send for a notification in Pending or Retry and
    /// records the outcome. Channel failures, timeouts, a missing channel
    /// and pool saturation all land in `Failed` for the retry sweep.
    async fn send(&self, mut notification: Notification) -> Result<Notification, DomainError> {
        notification.begin_sending()?;
        let notification = self.repo.update(notification).await?;

        let _slot = match self.workers.try_acquire() {
            Ok(slot) => slot,
            Err(saturated) => {
                return self.record_failure(notification, saturated.to_string()).await;
            }
        };
        let Some(channel) = self.channels.get(&notification.notification_type) else {
            let reason = format!("no {} channel registered", notification.notification_type);
            return self.record_failure(notification, reason).await;
        };

        let outcome = tokio::time::timeout(
            self.send_timeout,
            channel.send(
                &notification.recipient,
                notification.subject.as_deref(),
                &notification.message,
            ),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                let mut notification = notification;
                notification.mark_sent()?;
                let notification = self.repo.update(notification).await?;

                tracing::info!(
                    notification_id = %notification.id,
                    channel = %notification.notification_type,
                    recipient = %notification.recipient,
                    "notification sent"
                );
                metrics::counter!("notifications_sent_total", "channel" => notification.notification_type.as_str())
                    .increment(1);
                self.publish_event(EventType::NotificationSent, &notification).await;
                Ok(notification)
            }
            Ok(Err(error)) => self.record_failure(notification, error.to_string()).await,
            Err(_) => {
                let reason = format!("send exceeded {}ms", self.send_timeout.as_millis());
                self.record_failure(notification, reason).await
            }
        }
    }

    async fn record_failure(
        &self,
        mut notification: Notification,
        reason: String,
    ) -> Result<Notification, DomainError> {
        notification.mark_failed(reason)?;
        let notification = self.repo.update(notification).await?;

        tracing::warn!(
            notification_id = %notification.id,
            channel = %notification.notification_type,
            reason = notification.error_message.as_deref().unwrap_or_default(),
            "notification send failed"
        );
        metrics::counter!("notifications_failed_total", "channel" => notification.notification_type.as_str())
            .increment(1);
        self.publish_event(EventType::NotificationFailed, &notification).await;
        Ok(notification)
    }

    async fn publish_event(&self, event_type: EventType, notification: &Notification) {
        let envelope = Envelope::new(
            event_type,
            SOURCE,
            EventPayload::Notification(NotificationPayload {
                notification_id: notification.id,
                notification_type: notification.notification_type.to_string(),
                recipient: notification.recipient.clone(),
                related_entity_type: notification.related_entity_type.clone(),
                related_entity_id: notification.related_entity_id.clone(),
                status: notification.status.to_string(),
            }),
        );
        if let Err(error) = self
            .bus
            .publish(envelope.topic(), &notification.related_entity_id, &envelope)
            .await
        {
            tracing::error!(
                notification_id = %notification.id,
                event_type = %event_type,
                %error,
                "failed to publish notification event"
            );
            metrics::counter!("notification_event_publish_failures_total").increment(1);
        }
    }
}

/// Maps one event to its channel sends. Events outside the fan-out table
/// produce nothing.
pub fn plan_sends(envelope: &Envelope) -> Vec<PlannedSend> {
    match (&envelope.event_type, &envelope.payload) {
        (EventType::OrderCreated, EventPayload::Order(order)) => vec![email_for_order(
            order,
            format!("Order Confirmation - {}", order.order_number),
            format!(
                "Dear {}, your order {} for {} has been received and is being processed.",
                order.customer_name, order.order_number, order.total_amount
            ),
        )],
        (EventType::OrderCancelled, EventPayload::Order(order)) => vec![email_for_order(
            order,
            format!("Order Cancelled - {}", order.order_number),
            format!(
                "Dear {}, your order {} has been cancelled. Any captured payment will be refunded.",
                order.customer_name, order.order_number
            ),
        )],
        (EventType::PaymentCompleted, EventPayload::Payment(payment)) => vec![
            email_for_payment(
                payment,
                format!("Payment Received - {}", payment.order_number),
                format!(
                    "Dear {}, we received your payment of {} for order {} (transaction {}).",
                    payment.customer_name,
                    payment.amount,
                    payment.order_number,
                    or_missing(payment.transaction_id.as_deref()),
                ),
            ),
            sms_for_payment(
                payment,
                format!(
                    "Payment of {} for order {} confirmed.",
                    payment.amount, payment.order_number
                ),
            ),
        ],
        (EventType::PaymentFailed, EventPayload::Payment(payment)) => vec![email_for_payment(
            payment,
            format!("Payment Failed - {}", payment.order_number),
            format!(
                "Dear {}, your payment of {} for order {} failed: {}. We will retry shortly.",
                payment.customer_name,
                payment.amount,
                payment.order_number,
                or_missing(payment.failure_reason.as_deref()),
            ),
        )],
        (EventType::DeliveryAssigned, EventPayload::Delivery(delivery)) => {
            vec![PlannedSend {
                notification_type: NotificationType::Sms,
                recipient: delivery.customer_phone.clone(),
                subject: None,
                message: format!(
                    "Your order {} has been assigned to {} for delivery.",
                    delivery.order_number,
                    or_missing(delivery.agent_name.as_deref()),
                ),
                related_entity_type: "DELIVERY",
                related_entity_id: delivery.delivery_number.clone(),
            }]
        }
        (EventType::DeliveryInTransit, EventPayload::Delivery(delivery)) => {
            vec![PlannedSend {
                notification_type: NotificationType::Push,
                recipient: delivery.customer_email.clone(),
                subject: None,
                message: format!(
                    "Order {} is on its way. Track it at {}.",
                    delivery.order_number,
                    or_missing(delivery.tracking_url.as_deref()),
                ),
                related_entity_type: "DELIVERY",
                related_entity_id: delivery.delivery_number.clone(),
            }]
        }
        (EventType::DeliveryCompleted, EventPayload::Delivery(delivery)) => vec![
            PlannedSend {
                notification_type: NotificationType::Email,
                recipient: delivery.customer_email.clone(),
                subject: Some(format!("Order Delivered - {}", delivery.order_number)),
                message: format!(
                    "Dear {}, your order {} has been delivered. Thank you for shopping with us!",
                    delivery.customer_name, delivery.order_number
                ),
                related_entity_type: "DELIVERY",
                related_entity_id: delivery.delivery_number.clone(),
            },
            PlannedSend {
                notification_type: NotificationType::Sms,
                recipient: delivery.customer_phone.clone(),
                subject: None,
                message: format!("Order {} delivered. Enjoy!", delivery.order_number),
                related_entity_type: "DELIVERY",
                related_entity_id: delivery.delivery_number.clone(),
            },
        ],
        _ => Vec::new(),
    }
}

fn email_for_order(order: &OrderPayload, subject: String, message: String) -> PlannedSend {
    PlannedSend {
        notification_type: NotificationType::Email,
        recipient: order.customer_email.clone(),
        subject: Some(subject),
        message,
        related_entity_type: "ORDER",
        related_entity_id: order.order_number.clone(),
    }
}

fn email_for_payment(payment: &PaymentPayload, subject: String, message: String) -> PlannedSend {
    PlannedSend {
        notification_type: NotificationType::Email,
        recipient: payment.customer_email.clone(),
        subject: Some(subject),
        message,
        related_entity_type: "PAYMENT",
        related_entity_id: payment.payment_number.clone(),
    }
}

fn sms_for_payment(payment: &PaymentPayload, message: String) -> PlannedSend {
    PlannedSend {
        notification_type: NotificationType::Sms,
        recipient: payment.customer_phone.clone(),
        subject: None,
        message,
        related_entity_type: "PAYMENT",
        related_entity_id: payment.payment_number.clone(),
    }
}

fn or_missing(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => MISSING_FIELD,
    }
}

#[async_trait]
impl EventHandler for NotificationDispatcher {
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError> {
        let envelope = message
            .envelope()
            .map_err(|e| HandlerError::DeadLetter(format!("malformed event: {e}")))?;
        if self.processed.contains(envelope.event_id).await {
            return Ok(());
        }

        let mut storage_error = None;
        for planned in plan_sends(&envelope) {
            let channel = planned.notification_type;
            // A failed send is recorded on the row and never aborts the
            // sibling sends. A storage error leaves no row for the retry
            // sweep to find, so it must force a redelivery; the remaining
            // siblings still get their attempt first.
            if let Err(error) = self.dispatch(planned).await {
                tracing::error!(%channel, %error, "could not record notification");
                storage_error = Some(error);
            }
        }
        if let Some(error) = storage_error {
            return Err(HandlerError::Retry(error.to_string()));
        }
        self.processed.mark_processed(envelope.event_id).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use domain::{InMemoryNotificationRepository, NotificationStatus};
    use event_bus::InMemoryEventBus;

    struct Fixture {
        bus: Arc<InMemoryEventBus>,
        repo: Arc<InMemoryNotificationRepository>,
        email: Arc<crate::channels::InMemoryChannel>,
        sms: Arc<crate::channels::InMemoryChannel>,
        push: Arc<crate::channels::InMemoryChannel>,
        dispatcher: Arc<NotificationDispatcher>,
    }

    async fn fixture() -> Fixture {
        let bus = Arc::new(InMemoryEventBus::new());
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let email = Arc::new(crate::channels::InMemoryChannel::new(NotificationType::Email));
        let sms = Arc::new(crate::channels::InMemoryChannel::new(NotificationType::Sms));
        let push = Arc::new(crate::channels::InMemoryChannel::new(NotificationType::Push));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            repo.clone(),
            bus.clone(),
            vec![email.clone(), sms.clone(), push.clone()],
            WorkerPool::new("notification-sends", 4),
            3,
        ));
        bus.subscribe(
            NotificationDispatcher::topics(),
            "notification-service",
            dispatcher.clone(),
        )
        .await
        .unwrap();
        Fixture {
            bus,
            repo,
            email,
            sms,
            push,
            dispatcher,
        }
    }

    fn payment_completed() -> Envelope {
        Envelope::new(
            EventType::PaymentCompleted,
            "payment-service",
            EventPayload::Payment(PaymentPayload {
                payment_id: common::PaymentId::new(),
                payment_number: "PAY-1".to_string(),
                order_id: common::OrderId::new(),
                order_number: "ORD-1".to_string(),
                customer_id: common::CustomerId::new(),
                customer_name: "Jane Doe".to_string(),
                customer_email: "jane@example.com".to_string(),
                customer_phone: "+1-555-0100".to_string(),
                amount: Money::from_cents(2500),
                status: "COMPLETED".to_string(),
                transaction_id: Some("TXN-1".to_string()),
                failure_reason: None,
            }),
        )
    }

    fn delivery_in_transit() -> Envelope {
        Envelope::new(
            EventType::DeliveryInTransit,
            "delivery-service",
            EventPayload::Delivery(DeliveryPayload {
                delivery_number: "DEL-1".to_string(),
                order_number: "ORD-1".to_string(),
                customer_name: "Jane Doe".to_string(),
                customer_phone: "+1-555-0100".to_string(),
                customer_email: "jane@example.com".to_string(),
                agent_name: Some("Alex".to_string()),
                tracking_url: None,
                estimated_delivery_time: None,
            }),
        )
    }

    #[tokio::test]
    async fn payment_completed_fans_out_email_and_sms() {
        let f = fixture().await;
        f.bus
            .publish(Topic::PaymentCompleted, "ORD-1", &payment_completed())
            .await
            .unwrap();
        f.bus.drain().await;

        let rows = f.repo.all().await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|n| n.related_entity_id == "PAY-1"));
        assert!(rows.iter().all(|n| n.status == NotificationStatus::Sent));
        assert_eq!(f.email.sent_count().await, 1);
        assert_eq!(f.sms.sent_count().await, 1);
        assert_eq!(f.bus.envelopes_on(Topic::NotificationSent).await.len(), 2);
    }

    #[tokio::test]
    async fn one_channel_failing_does_not_block_the_other() {
        let f = fixture().await;
        f.sms.fail_next(1).await;
        f.bus
            .publish(Topic::PaymentCompleted, "ORD-1", &payment_completed())
            .await
            .unwrap();
        f.bus.drain().await;

        let rows = f.repo.all().await;
        assert_eq!(rows.len(), 2);
        let email = rows
            .iter()
            .find(|n| n.notification_type == NotificationType::Email)
            .unwrap();
        let sms = rows
            .iter()
            .find(|n| n.notification_type == NotificationType::Sms)
            .unwrap();
        assert_eq!(email.status, NotificationStatus::Sent);
        assert_eq!(sms.status, NotificationStatus::Failed);
        assert!(sms.error_message.is_some());
        assert_eq!(sms.retry_count, 0);
        assert_eq!(f.bus.envelopes_on(Topic::NotificationFailed).await.len(), 1);
    }

    #[tokio::test]
    async fn failed_notification_can_be_retried() {
        let f = fixture().await;
        f.sms.fail_next(1).await;
        f.bus
            .publish(Topic::PaymentCompleted, "ORD-1", &payment_completed())
            .await
            .unwrap();
        f.bus.drain().await;

        let failed = f
            .repo
            .all()
            .await
            .into_iter()
            .find(|n| n.status == NotificationStatus::Failed)
            .unwrap();
        let retried = f.dispatcher.retry_notification(failed.id).await.unwrap();
        assert_eq!(retried.status, NotificationStatus::Sent);
        assert_eq!(retried.retry_count, 1);
        assert_eq!(f.sms.sent_count().await, 1);
    }

    #[tokio::test]
    async fn delivery_in_transit_sends_push_with_placeholder() {
        let f = fixture().await;
        f.bus
            .publish(Topic::DeliveryInTransit, "DEL-1", &delivery_in_transit())
            .await
            .unwrap();
        f.bus.drain().await;

        let sent = f.push.sent().await;
        assert_eq!(sent.len(), 1);
        // No tracking URL on the event; the template substitutes N/A.
        assert!(sent[0].message.contains("N/A"));
    }

    #[tokio::test]
    async fn malformed_payload_is_dead_lettered() {
        let f = fixture().await;
        let message = BusMessage {
            topic: Topic::OrderCreated,
            key: "ORD-1".to_string(),
            payload: "{not json".to_string(),
        };
        let verdict = f.dispatcher.handle(&message).await;
        assert!(matches!(verdict, Err(HandlerError::DeadLetter(_))));
    }

    #[tokio::test]
    async fn ignored_event_types_produce_no_rows() {
        let f = fixture().await;
        let envelope = Envelope::new(
            EventType::NotificationSent,
            "notification-service",
            EventPayload::Notification(NotificationPayload {
                notification_id: common::NotificationId::new(),
                notification_type: "EMAIL".to_string(),
                recipient: "jane@example.com".to_string(),
                related_entity_type: "ORDER".to_string(),
                related_entity_id: "ORD-1".to_string(),
                status: "SENT".to_string(),
            }),
        );
        assert!(plan_sends(&envelope).is_empty());
        assert_eq!(f.repo.len().await, 0);
    }

    /// Notification store whose next `insert` calls fail transiently.
    struct FlakyNotificationRepository {
        inner: Arc<InMemoryNotificationRepository>,
        insert_failures: tokio::sync::Mutex<u32>,
    }

    #[async_trait]
    impl NotificationRepository for FlakyNotificationRepository {
        async fn insert(&self, notification: Notification) -> Result<Notification, DomainError> {
            let mut failures = self.insert_failures.lock().await;
            if *failures > 0 {
                *failures -= 1;
                return Err(DomainError::TransientExternal(
                    "notification store unavailable".to_string(),
                ));
            }
            drop(failures);
            self.inner.insert(notification).await
        }

        async fn update(&self, notification: Notification) -> Result<Notification, DomainError> {
            self.inner.update(notification).await
        }

        async fn find_by_id(
            &self,
            id: common::NotificationId,
        ) -> Result<Option<Notification>, DomainError> {
            self.inner.find_by_id(id).await
        }

        async fn find_retryable(&self) -> Result<Vec<Notification>, DomainError> {
            self.inner.find_retryable().await
        }

        async fn find_by_related_entity(
            &self,
            related_entity_id: &str,
        ) -> Result<Vec<Notification>, DomainError> {
            self.inner.find_by_related_entity(related_entity_id).await
        }

        async fn count_by_status(
            &self,
            status: NotificationStatus,
        ) -> Result<usize, DomainError> {
            self.inner.count_by_status(status).await
        }
    }

    #[tokio::test]
    async fn storage_failure_forces_redelivery_until_the_send_is_recorded() {
        let bus = Arc::new(InMemoryEventBus::new());
        let inner = Arc::new(InMemoryNotificationRepository::new());
        let repo = Arc::new(FlakyNotificationRepository {
            inner: inner.clone(),
            insert_failures: tokio::sync::Mutex::new(1),
        });
        let email = Arc::new(crate::channels::InMemoryChannel::new(NotificationType::Email));
        let sms = Arc::new(crate::channels::InMemoryChannel::new(NotificationType::Sms));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            repo,
            bus.clone(),
            vec![email.clone(), sms.clone()],
            WorkerPool::new("notification-sends", 4),
            3,
        ));
        bus.subscribe(
            NotificationDispatcher::topics(),
            "notification-service",
            dispatcher,
        )
        .await
        .unwrap();

        bus.publish(Topic::PaymentCompleted, "ORD-1", &payment_completed())
            .await
            .unwrap();
        bus.drain().await;

        // The first delivery lost the email row to the store, so the event
        // must come back around. A notification that never reached the store
        // is invisible to the retry sweep; only a redelivery can recover it.
        let rows = inner.all().await;
        let emails: Vec<_> = rows
            .iter()
            .filter(|n| n.notification_type == NotificationType::Email)
            .collect();
        assert_eq!(emails.len(), 1);
        assert!(rows.iter().all(|n| n.status == NotificationStatus::Sent));
        // The sibling SMS went out on the first delivery and again on the
        // redelivery: at-least-once, never zero-times.
        assert_eq!(sms.sent_count().await, 2);
        assert!(
            bus.published_to(Topic::DeadLetter(event_bus::Domain::Payment))
                .await
                .is_empty()
        );
    }
}
