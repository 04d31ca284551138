//! Service health checks.
//!
//! The checker probes each configured service endpoint on an interval. The
//! endpoint map is injected configuration, immutable after startup; the
//! probe itself is a trait so tests run against a scripted implementation
//! instead of the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::observer::{MonitoringFeed, MonitoringUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Latest known health of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
    pub health_url: String,
    /// Round-trip time of the successful probe.
    pub response_time: Option<Duration>,
    pub error_details: Option<String>,
    pub last_checked: DateTime<Utc>,
}

/// One endpoint probe.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Probes `url`, returning the round-trip time on success.
    async fn probe(&self, url: &str) -> Result<Duration, String>;
}

/// Probe over HTTP; any 2xx answer within the timeout counts as up.
pub struct HttpHealthProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpHealthProbe {
    pub fn new(timeout: Duration) -> Self {
        // Timeout is enforced per request, not on the client builder.
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, url: &str) -> Result<Duration, String> {
        let started = std::time::Instant::now();
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(started.elapsed())
        } else {
            Err(format!("status {}", response.status()))
        }
    }
}

/// Scripted probe for tests: every URL not marked down answers in 1ms.
#[derive(Debug, Default)]
pub struct StaticHealthProbe {
    down: RwLock<Vec<String>>,
}

impl StaticHealthProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_down(&self, url: &str) {
        self.down.write().await.push(url.to_string());
    }

    pub async fn set_up(&self, url: &str) {
        self.down.write().await.retain(|u| u != url);
    }
}

#[async_trait]
impl HealthProbe for StaticHealthProbe {
    async fn probe(&self, url: &str) -> Result<Duration, String> {
        if self.down.read().await.iter().any(|u| u == url) {
            Err("connection refused".to_string())
        } else {
            Ok(Duration::from_millis(1))
        }
    }
}

/// Probes every configured service and keeps the latest result.
pub struct HealthChecker {
    probe: Arc<dyn HealthProbe>,
    /// service name -> health URL, from configuration.
    endpoints: Vec<(String, String)>,
    statuses: RwLock<HashMap<String, ServiceHealth>>,
    feed: MonitoringFeed,
}

impl HealthChecker {
    pub fn new(
        probe: Arc<dyn HealthProbe>,
        endpoints: Vec<(String, String)>,
        feed: MonitoringFeed,
    ) -> Self {
        Self {
            probe,
            endpoints,
            statuses: RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Probes every endpoint concurrently and records the results. Status
    /// flips are pushed on the feed.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Vec<ServiceHealth> {
        let probes = self.endpoints.iter().map(|(service, url)| {
            let probe = Arc::clone(&self.probe);
            async move {
                let outcome = probe.probe(url).await;
                match outcome {
                    Ok(elapsed) => ServiceHealth {
                        service: service.clone(),
                        status: HealthStatus::Up,
                        health_url: url.clone(),
                        response_time: Some(elapsed),
                        error_details: None,
                        last_checked: Utc::now(),
                    },
                    Err(error) => {
                        tracing::warn!(service = %service, url = %url, %error, "health probe failed");
                        ServiceHealth {
                            service: service.clone(),
                            status: HealthStatus::Down,
                            health_url: url.clone(),
                            response_time: None,
                            error_details: Some(error),
                            last_checked: Utc::now(),
                        }
                    }
                }
            }
        });
        let results = join_all(probes).await;

        let mut statuses = self.statuses.write().await;
        for health in &results {
            let flipped = statuses
                .get(&health.service)
                .is_none_or(|previous| previous.status != health.status);
            statuses.insert(health.service.clone(), health.clone());
            metrics::gauge!("service_up", "service" => health.service.clone())
                .set(if health.status == HealthStatus::Up { 1.0 } else { 0.0 });
            if flipped {
                self.feed
                    .publish(MonitoringUpdate::HealthChanged(health.clone()));
            }
        }
        results
    }

    /// Latest known health per service.
    pub async fn snapshot(&self) -> Vec<ServiceHealth> {
        let statuses = self.statuses.read().await;
        let mut all: Vec<_> = statuses.values().cloned().collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }

    /// Production loop: probes every `interval`.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }
}
