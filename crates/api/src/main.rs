//! API server entry point.

use std::time::Duration;

use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use api::config::Config;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire the pipeline and shared state
    let (state, runtime) = api::create_default_state(&config).await;

    // 4. Start the background loops: delivery pump, retry sweep, metrics
    //    snapshots and health probes.
    {
        let bus = runtime.bus.clone();
        tokio::spawn(async move { bus.run_pump(Duration::from_millis(100)).await });
    }
    {
        let scheduler = runtime.scheduler.clone();
        let interval = Duration::from_secs(config.retry_interval_secs);
        tokio::spawn(async move { scheduler.run(interval).await });
    }
    {
        let collector = runtime.collector.clone();
        let interval = Duration::from_secs(config.metrics_interval_secs);
        tokio::spawn(async move { collector.run(interval).await });
    }
    {
        let health_checker = runtime.health_checker.clone();
        let interval = Duration::from_secs(config.health_interval_secs);
        tokio::spawn(async move { health_checker.run(interval).await });
    }

    // 5. Build and serve the application
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
