//! In-process event bus implementation.
//!
//! Stands in for a real broker client behind the [`EventBus`] trait.
//! `publish` only enqueues, so a caller's business transaction never blocks
//! on delivery; [`drain`] pumps queued messages (including any published
//! from inside handlers) until the queue is empty, which keeps integration
//! tests deterministic. A production deployment runs [`drain`] from a pump
//! task on an interval.
//!
//! [`drain`]: InMemoryEventBus::drain

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::client::{BusMessage, EventBus, EventHandler, HandlerError};
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::topic::Topic;

struct Subscription {
    group: String,
    topics: Vec<Topic>,
    handler: Arc<dyn EventHandler>,
}

struct Inner {
    queue: Mutex<VecDeque<BusMessage>>,
    subscriptions: RwLock<Vec<Subscription>>,
    published: Mutex<Vec<BusMessage>>,
    max_delivery_attempts: u32,
}

/// In-memory bus with consumer-group fan-out, bounded redelivery and
/// dead-letter routing.
#[derive(Clone)]
pub struct InMemoryEventBus {
    inner: Arc<Inner>,
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventBus {
    /// Creates a bus with the default in-handler delivery bound (3).
    pub fn new() -> Self {
        Self::with_max_delivery_attempts(3)
    }

    /// Creates a bus that gives each message up to `attempts` deliveries
    /// per consumer group before dead-lettering it.
    pub fn with_max_delivery_attempts(attempts: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(VecDeque::new()),
                subscriptions: RwLock::new(Vec::new()),
                published: Mutex::new(Vec::new()),
                max_delivery_attempts: attempts.max(1),
            }),
        }
    }

    /// Delivers queued messages until the queue is empty.
    ///
    /// Messages published by handlers during delivery are picked up by the
    /// same drain pass, so a full choreography (order → payment →
    /// notification) settles in one call.
    pub async fn drain(&self) {
        loop {
            let message = { self.inner.queue.lock().await.pop_front() };
            let Some(message) = message else { break };
            self.deliver(&message).await;
        }
    }

    /// Runs the delivery pump until cancelled, draining on an interval.
    pub async fn run_pump(&self, poll_interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            self.drain().await;
        }
    }

    async fn deliver(&self, message: &BusMessage) {
        // Within a consumer group each message is delivered once; distinct
        // groups each get their own copy.
        let targets: Vec<(String, Arc<dyn EventHandler>)> = {
            let subscriptions = self.inner.subscriptions.read().await;
            let mut seen_groups: Vec<&str> = Vec::new();
            let mut targets = Vec::new();
            for sub in subscriptions.iter() {
                if sub.topics.contains(&message.topic) && !seen_groups.contains(&sub.group.as_str())
                {
                    seen_groups.push(sub.group.as_str());
                    targets.push((sub.group.clone(), Arc::clone(&sub.handler)));
                }
            }
            targets
        };

        for (group, handler) in targets {
            self.deliver_to_group(message, &group, handler.as_ref()).await;
        }
    }

    async fn deliver_to_group(&self, message: &BusMessage, group: &str, handler: &dyn EventHandler) {
        for attempt in 1..=self.inner.max_delivery_attempts {
            match handler.handle(message).await {
                Ok(()) => {
                    // Success is the only outcome that acknowledges the
                    // message and advances this group's offset.
                    metrics::counter!("bus_messages_acked_total").increment(1);
                    return;
                }
                Err(HandlerError::Retry(reason)) => {
                    metrics::counter!("bus_messages_retried_total").increment(1);
                    tracing::warn!(
                        topic = message.topic.as_str(),
                        key = %message.key,
                        group,
                        attempt,
                        %reason,
                        "handler failed, message will be redelivered"
                    );
                }
                Err(HandlerError::DeadLetter(reason)) => {
                    tracing::warn!(
                        topic = message.topic.as_str(),
                        key = %message.key,
                        group,
                        %reason,
                        "handler rejected message permanently"
                    );
                    self.dead_letter(message).await;
                    return;
                }
            }
        }

        tracing::error!(
            topic = message.topic.as_str(),
            key = %message.key,
            group,
            attempts = self.inner.max_delivery_attempts,
            "delivery attempts exhausted"
        );
        self.dead_letter(message).await;
    }

    async fn dead_letter(&self, message: &BusMessage) {
        // Dead-letter topics are terminal; a failed dead-letter consumer
        // must not loop the message back.
        if message.topic.is_dead_letter() {
            return;
        }
        let dlt = message.topic.domain().dead_letter_topic();
        metrics::counter!("bus_messages_dead_lettered_total").increment(1);
        let copy = BusMessage {
            topic: dlt,
            key: message.key.clone(),
            payload: message.payload.clone(),
        };
        self.inner.published.lock().await.push(copy.clone());
        self.inner.queue.lock().await.push_back(copy);
    }

    /// Returns every message published to a topic, in publish order.
    pub async fn published_to(&self, topic: Topic) -> Vec<BusMessage> {
        self.inner
            .published
            .lock()
            .await
            .iter()
            .filter(|m| m.topic == topic)
            .cloned()
            .collect()
    }

    /// Returns the parsed envelopes published to a topic, skipping any
    /// payload that is not a well-formed envelope.
    pub async fn envelopes_on(&self, topic: Topic) -> Vec<Envelope> {
        self.published_to(topic)
            .await
            .iter()
            .filter_map(|m| m.envelope().ok())
            .collect()
    }

    /// Total number of messages ever published.
    pub async fn published_count(&self) -> usize {
        self.inner.published.lock().await.len()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish_raw(&self, topic: Topic, key: &str, payload: String) -> Result<(), BusError> {
        let message = BusMessage {
            topic,
            key: key.to_string(),
            payload,
        };
        metrics::counter!("bus_messages_published_total").increment(1);
        tracing::debug!(topic = topic.as_str(), key, "message published");
        self.inner.published.lock().await.push(message.clone());
        self.inner.queue.lock().await.push_back(message);
        Ok(())
    }

    async fn subscribe(
        &self,
        topics: Vec<Topic>,
        group: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), BusError> {
        if topics.is_empty() {
            return Err(BusError::Subscribe(
                "subscription requires at least one topic".to_string(),
            ));
        }
        self.inner.subscriptions.write().await.push(Subscription {
            group: group.to_string(),
            topics,
            handler,
        });
        Ok(())
    }
}
