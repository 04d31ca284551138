//! Dashboard queries over the monitoring stores.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use monitoring::{EventLog, ServiceHealth, SystemMetrics};
use serde::Deserialize;

use crate::error::ApiError;
use crate::routes::orders::AppState;

#[derive(Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
    pub event_type: Option<String>,
    pub source: Option<String>,
}

/// GET /dashboard/events — most recent observed events, newest first.
/// `event_type` and `source` filter; without a filter the latest rows are
/// returned.
#[tracing::instrument(skip(state, query))]
pub async fn events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventLog>>, ApiError> {
    let rows = match (query.event_type, query.source) {
        (Some(event_type), _) => state.event_log.find_by_type(&event_type).await,
        (None, Some(source)) => state.event_log.find_by_source(&source).await,
        (None, None) => state.event_log.latest(query.limit.unwrap_or(50)).await,
    };
    Ok(Json(rows))
}

/// GET /dashboard/metrics — the latest system metrics snapshot, taking one
/// on demand if the collector has not run yet.
#[tracing::instrument(skip(state))]
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Json<SystemMetrics>, ApiError> {
    let snapshot = match state.metrics_collector.latest().await {
        Some(snapshot) => snapshot,
        None => state.metrics_collector.collect().await,
    };
    Ok(Json(snapshot))
}

/// GET /dashboard/health — latest known health per monitored service.
#[tracing::instrument(skip(state))]
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Vec<ServiceHealth>> {
    Json(state.health_checker.snapshot().await)
}
