//! Monitoring aggregator.
//!
//! Taps every domain topic with its own consumer group and records each
//! envelope in the event log. Observation must never disturb the pipeline:
//! the handler always acknowledges, and a malformed payload becomes a
//! Failed/UNKNOWN row instead of a redelivery loop.

use std::sync::Arc;

use async_trait::async_trait;
use event_bus::{BusMessage, EventHandler, HandlerError, Topic};

use crate::event_log::{EventLog, EventLogStore};
use crate::observer::{MonitoringFeed, MonitoringUpdate};

/// Consumer group name; distinct from every domain group so the aggregator
/// gets its own copy of each message.
pub const CONSUMER_GROUP: &str = "monitoring-service";

pub struct MonitoringAggregator {
    store: Arc<dyn EventLogStore>,
    feed: MonitoringFeed,
}

impl MonitoringAggregator {
    pub fn new(store: Arc<dyn EventLogStore>, feed: MonitoringFeed) -> Self {
        Self { store, feed }
    }

    /// Every regular domain topic.
    pub fn topics() -> Vec<Topic> {
        Topic::all_domain_topics().to_vec()
    }
}

#[async_trait]
impl EventHandler for MonitoringAggregator {
    async fn handle(&self, message: &BusMessage) -> Result<(), HandlerError> {
        let row = match message.envelope() {
            Ok(envelope) => {
                let row = self
                    .store
                    .append(EventLog::received(
                        envelope.event_id,
                        envelope.event_type.as_str(),
                        &envelope.source,
                        message.topic.as_str(),
                        &message.payload,
                    ))
                    .await;
                self.store.mark_processed(row.id).await;
                metrics::counter!("monitoring_events_logged_total").increment(1);
                row
            }
            Err(error) => {
                tracing::warn!(
                    topic = message.topic.as_str(),
                    key = %message.key,
                    %error,
                    "recording unparseable event"
                );
                metrics::counter!("monitoring_events_unparseable_total").increment(1);
                self.store
                    .append(EventLog::unparseable(
                        message.topic.as_str(),
                        &message.payload,
                    ))
                    .await
            }
        };
        self.feed.publish(MonitoringUpdate::EventLogged(row));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::{EventLogStatus, InMemoryEventLogStore, UNKNOWN_EVENT_TYPE};
    use common::{CustomerId, Money, OrderId};
    use event_bus::{
        Envelope, EventBus, EventPayload, EventType, InMemoryEventBus, OrderPayload,
    };

    fn order_created() -> Envelope {
        Envelope::new(
            EventType::OrderCreated,
            "order-service",
            EventPayload::Order(OrderPayload {
                order_id: OrderId::new(),
                order_number: "ORD-1".to_string(),
                customer_id: CustomerId::new(),
                customer_name: "Jane Doe".to_string(),
                customer_email: "jane@example.com".to_string(),
                customer_phone: "+1-555-0100".to_string(),
                delivery_address: "1 Main St".to_string(),
                total_amount: Money::from_cents(2500),
                status: "CREATED".to_string(),
                items: vec![],
            }),
        )
    }

    #[tokio::test]
    async fn logs_every_observed_event_as_processed() {
        let bus = InMemoryEventBus::new();
        let store = Arc::new(InMemoryEventLogStore::new());
        let aggregator = Arc::new(MonitoringAggregator::new(
            store.clone(),
            MonitoringFeed::default(),
        ));
        bus.subscribe(MonitoringAggregator::topics(), CONSUMER_GROUP, aggregator)
            .await
            .unwrap();

        bus.publish(Topic::OrderCreated, "ORD-1", &order_created())
            .await
            .unwrap();
        bus.drain().await;

        assert_eq!(store.len().await, 1);
        let row = store.latest(1).await.remove(0);
        assert_eq!(row.event_type, "ORDER_CREATED");
        assert_eq!(row.source_service, "order-service");
        assert_eq!(row.topic, "order.created");
        assert_eq!(row.status, EventLogStatus::Processed);
    }

    #[tokio::test]
    async fn malformed_payload_is_logged_and_acknowledged() {
        let store = Arc::new(InMemoryEventLogStore::new());
        let aggregator = MonitoringAggregator::new(store.clone(), MonitoringFeed::default());

        let message = BusMessage {
            topic: Topic::PaymentCompleted,
            key: "ORD-1".to_string(),
            payload: "{broken".to_string(),
        };
        // Always acknowledges: observation must not cause redelivery.
        aggregator.handle(&message).await.unwrap();

        let row = store.latest(1).await.remove(0);
        assert_eq!(row.event_type, UNKNOWN_EVENT_TYPE);
        assert_eq!(row.status, EventLogStatus::Failed);
        assert_eq!(row.payload, "{broken");
    }

    #[tokio::test]
    async fn feed_receives_logged_events() {
        let store = Arc::new(InMemoryEventLogStore::new());
        let feed = MonitoringFeed::default();
        let mut rx = feed.subscribe();
        let aggregator = MonitoringAggregator::new(store, feed);

        let message = BusMessage {
            topic: Topic::OrderCreated,
            key: "ORD-1".to_string(),
            payload: order_created().to_json().unwrap(),
        };
        aggregator.handle(&message).await.unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            MonitoringUpdate::EventLogged(_)
        ));
    }
}
