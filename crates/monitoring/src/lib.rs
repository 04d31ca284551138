//! Observability for the choreography: an event log fed by a tap on every
//! topic, periodic system-metrics snapshots, service health checks and a
//! live update feed.

pub mod aggregator;
pub mod event_log;
pub mod health;
pub mod metrics;
pub mod observer;

pub use aggregator::{MonitoringAggregator, CONSUMER_GROUP};
pub use event_log::{EventLog, EventLogStatus, EventLogStore, InMemoryEventLogStore};
pub use health::{
    HealthChecker, HealthProbe, HealthStatus, HttpHealthProbe, ServiceHealth, StaticHealthProbe,
};
pub use metrics::{MetricsCollector, SystemMetrics};
pub use observer::{MonitoringFeed, MonitoringUpdate};
