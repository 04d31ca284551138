//! System metrics snapshots derived from the event log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::event_log::EventLogStore;
use crate::observer::{MonitoringFeed, MonitoringUpdate};

/// One point-in-time aggregate over everything the aggregator has seen.
/// Snapshots are appended, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub total_events: usize,
    pub orders_created: usize,
    pub orders_cancelled: usize,
    pub payments_completed: usize,
    pub payments_failed: usize,
    /// Completed / (completed + failed); 0.0 when no payment has finished.
    pub payment_success_rate: f64,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
    pub deliveries_completed: usize,
    pub captured_at: DateTime<Utc>,
}

/// Periodically derives a [`SystemMetrics`] snapshot from the event log.
pub struct MetricsCollector {
    store: Arc<dyn EventLogStore>,
    feed: MonitoringFeed,
    snapshots: RwLock<Vec<SystemMetrics>>,
}

impl MetricsCollector {
    pub fn new(store: Arc<dyn EventLogStore>, feed: MonitoringFeed) -> Self {
        Self {
            store,
            feed,
            snapshots: RwLock::new(Vec::new()),
        }
    }

    /// Takes one snapshot, appends it and pushes it on the feed.
    #[tracing::instrument(skip(self))]
    pub async fn collect(&self) -> SystemMetrics {
        let counts = self.store.count_by_type().await;
        let count = |event_type: &str| counts.get(event_type).copied().unwrap_or(0);

        let payments_completed = count("PAYMENT_COMPLETED");
        let payments_failed = count("PAYMENT_FAILED");
        let finished = payments_completed + payments_failed;
        let snapshot = SystemMetrics {
            total_events: self.store.len().await,
            orders_created: count("ORDER_CREATED"),
            orders_cancelled: count("ORDER_CANCELLED"),
            payments_completed,
            payments_failed,
            payment_success_rate: if finished == 0 {
                0.0
            } else {
                payments_completed as f64 / finished as f64
            },
            notifications_sent: count("NOTIFICATION_SENT"),
            notifications_failed: count("NOTIFICATION_FAILED"),
            deliveries_completed: count("DELIVERY_COMPLETED"),
            captured_at: Utc::now(),
        };

        tracing::info!(
            total_events = snapshot.total_events,
            payment_success_rate = snapshot.payment_success_rate,
            "metrics snapshot captured"
        );
        metrics::gauge!("system_payment_success_rate").set(snapshot.payment_success_rate);
        self.snapshots.write().await.push(snapshot.clone());
        self.feed
            .publish(MonitoringUpdate::MetricsCaptured(snapshot.clone()));
        snapshot
    }

    /// Most recent snapshot, if any has been taken.
    pub async fn latest(&self) -> Option<SystemMetrics> {
        self.snapshots.read().await.last().cloned()
    }

    pub async fn history(&self) -> Vec<SystemMetrics> {
        self.snapshots.read().await.clone()
    }

    /// Production loop: one snapshot every `interval`.
    pub async fn run(&self, interval: std::time::Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.collect().await;
        }
    }
}
