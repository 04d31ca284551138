//! Live monitoring feed.
//!
//! A broadcast channel the aggregator, metrics collector and health checker
//! push updates onto; dashboard sessions subscribe and render as they
//! arrive. Lagging subscribers drop updates rather than applying
//! backpressure to the pipeline.

use tokio::sync::broadcast;

use crate::event_log::EventLog;
use crate::health::ServiceHealth;
use crate::metrics::SystemMetrics;

/// One pushed update.
#[derive(Debug, Clone)]
pub enum MonitoringUpdate {
    EventLogged(EventLog),
    MetricsCaptured(SystemMetrics),
    HealthChanged(ServiceHealth),
}

/// Fan-out handle for monitoring updates.
#[derive(Debug, Clone)]
pub struct MonitoringFeed {
    tx: broadcast::Sender<MonitoringUpdate>,
}

impl Default for MonitoringFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MonitoringFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitoringUpdate> {
        self.tx.subscribe()
    }

    /// Pushes an update. Having no subscribers is not an error.
    pub fn publish(&self, update: MonitoringUpdate) {
        let _ = self.tx.send(update);
    }
}
