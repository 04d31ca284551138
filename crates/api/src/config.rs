//! Application configuration loaded from environment variables.

/// Server and pipeline configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `PAYMENT_WORKERS` / `NOTIFICATION_WORKERS` — worker pool sizes
/// - `RETRY_INTERVAL_SECS` — retry sweep cadence (default: 60)
/// - `METRICS_INTERVAL_SECS` — metrics snapshot cadence (default: 30)
/// - `HEALTH_INTERVAL_SECS` — health probe cadence (default: 10)
/// - `<SERVICE>_HEALTH_URL` — health endpoint per monitored service
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub payment_workers: usize,
    pub notification_workers: usize,
    pub retry_interval_secs: u64,
    pub metrics_interval_secs: u64,
    pub health_interval_secs: u64,
    /// (service name, health URL) pairs for the health checker. Injected
    /// here once; nothing downstream hardcodes an endpoint.
    pub health_endpoints: Vec<(String, String)>,
}

const MONITORED_SERVICES: &[(&str, &str, &str)] = &[
    ("order-service", "ORDER_SERVICE_HEALTH_URL", "http://localhost:8081/actuator/health"),
    ("payment-service", "PAYMENT_SERVICE_HEALTH_URL", "http://localhost:8082/actuator/health"),
    ("delivery-service", "DELIVERY_SERVICE_HEALTH_URL", "http://localhost:8083/actuator/health"),
    ("notification-service", "NOTIFICATION_SERVICE_HEALTH_URL", "http://localhost:8084/actuator/health"),
];

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            payment_workers: env_or("PAYMENT_WORKERS", 8),
            notification_workers: env_or("NOTIFICATION_WORKERS", 8),
            retry_interval_secs: env_or("RETRY_INTERVAL_SECS", 60),
            metrics_interval_secs: env_or("METRICS_INTERVAL_SECS", 30),
            health_interval_secs: env_or("HEALTH_INTERVAL_SECS", 10),
            health_endpoints: MONITORED_SERVICES
                .iter()
                .map(|(service, var, default)| {
                    let url = std::env::var(var).unwrap_or_else(|_| (*default).to_string());
                    (service.to_string(), url)
                })
                .collect(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            payment_workers: 8,
            notification_workers: 8,
            retry_interval_secs: 60,
            metrics_interval_secs: 30,
            health_interval_secs: 10,
            health_endpoints: MONITORED_SERVICES
                .iter()
                .map(|(service, _, default)| (service.to_string(), default.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.payment_workers, 8);
        assert_eq!(config.health_endpoints.len(), 4);
    }

    #[test]
    fn addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn every_monitored_service_has_an_endpoint() {
        let config = Config::default();
        let services: Vec<_> = config
            .health_endpoints
            .iter()
            .map(|(s, _)| s.as_str())
            .collect();
        assert!(services.contains(&"order-service"));
        assert!(services.contains(&"notification-service"));
    }
}
