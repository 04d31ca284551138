//! HTTP API server and process bootstrap for the choreography engine.
//!
//! Wires the order lifecycle manager, payment orchestrator, notification
//! dispatcher and monitoring aggregator onto one in-process bus, exposes the
//! order and dashboard endpoints, and runs the periodic loops (bus pump,
//! retry sweep, metrics snapshots, health probes).

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use choreography::{
    InMemoryChannel, InMemoryPaymentGateway, NotificationDispatcher, OrderLifecycleManager,
    PaymentOrchestrator, RetryPolicy, RetryScheduler, WorkerPool,
};
use domain::{
    InMemoryNotificationRepository, InMemoryOrderRepository, InMemoryPaymentRepository,
    NotificationType,
};
use event_bus::{EventBus, InMemoryEventBus};
use metrics_exporter_prometheus::PrometheusHandle;
use monitoring::{
    HealthChecker, HttpHealthProbe, InMemoryEventLogStore, MetricsCollector, MonitoringAggregator,
    MonitoringFeed,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// The long-running pieces `main` drives after the state is wired.
pub struct Runtime {
    pub bus: Arc<InMemoryEventBus>,
    pub scheduler: Arc<RetryScheduler>,
    pub collector: Arc<MetricsCollector>,
    pub health_checker: Arc<HealthChecker>,
    pub feed: MonitoringFeed,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/payment", get(routes::orders::payment))
        .route("/orders/{id}/status", post(routes::orders::update_status))
        .route("/orders/{id}/cancel", post(routes::orders::cancel))
        .route("/customers/{id}/orders", get(routes::orders::by_customer))
        .route("/dashboard/events", get(routes::dashboard::events))
        .route("/dashboard/metrics", get(routes::dashboard::metrics))
        .route("/dashboard/health", get(routes::dashboard::health))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the full pipeline onto one in-process bus: repositories, the three
/// choreography services, the monitoring tap, the retry scheduler and the
/// health/metrics collectors. The gateway and channels are the in-memory
/// implementations standing in for real providers.
pub async fn create_default_state(config: &Config) -> (Arc<AppState>, Runtime) {
    let bus = Arc::new(InMemoryEventBus::new());
    let order_repo = Arc::new(InMemoryOrderRepository::new());
    let payment_repo = Arc::new(InMemoryPaymentRepository::new());
    let notification_repo = Arc::new(InMemoryNotificationRepository::new());
    let event_log = Arc::new(InMemoryEventLogStore::new());
    let feed = MonitoringFeed::default();

    let orders = Arc::new(OrderLifecycleManager::new(order_repo.clone(), bus.clone()));
    let payments = Arc::new(PaymentOrchestrator::new(
        payment_repo.clone(),
        bus.clone(),
        Arc::new(InMemoryPaymentGateway::new()),
        WorkerPool::new("payments", config.payment_workers),
        RetryPolicy::default(),
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        notification_repo.clone(),
        bus.clone(),
        vec![
            Arc::new(InMemoryChannel::new(NotificationType::Email)),
            Arc::new(InMemoryChannel::new(NotificationType::Sms)),
            Arc::new(InMemoryChannel::new(NotificationType::Push)),
        ],
        WorkerPool::new("notification-sends", config.notification_workers),
        RetryPolicy::default().max_retries,
    ));
    let aggregator = Arc::new(MonitoringAggregator::new(event_log.clone(), feed.clone()));

    // Subscriptions on the freshly-created bus cannot fail.
    let _ = bus
        .subscribe(
            OrderLifecycleManager::topics(),
            "order-service",
            orders.clone(),
        )
        .await;
    let _ = bus
        .subscribe(
            PaymentOrchestrator::topics(),
            "payment-service",
            payments.clone(),
        )
        .await;
    let _ = bus
        .subscribe(
            NotificationDispatcher::topics(),
            "notification-service",
            dispatcher.clone(),
        )
        .await;
    let _ = bus
        .subscribe(
            MonitoringAggregator::topics(),
            monitoring::CONSUMER_GROUP,
            aggregator,
        )
        .await;

    let scheduler = Arc::new(RetryScheduler::new(
        payments,
        dispatcher,
        payment_repo.clone(),
        notification_repo,
    ));
    let collector = Arc::new(MetricsCollector::new(event_log.clone(), feed.clone()));
    let health_checker = Arc::new(HealthChecker::new(
        Arc::new(HttpHealthProbe::new(std::time::Duration::from_secs(5))),
        config.health_endpoints.clone(),
        feed.clone(),
    ));

    let state = Arc::new(AppState {
        orders,
        payment_repo,
        event_log,
        metrics_collector: collector.clone(),
        health_checker: health_checker.clone(),
    });
    let runtime = Runtime {
        bus,
        scheduler,
        collector,
        health_checker,
        feed,
    };
    (state, runtime)
}
