//! Append-only event log.
//!
//! The monitoring aggregator records every envelope that crosses the bus
//! here, including ones it could not parse. Rows are never deleted; the
//! only mutation is marking a Received row Processed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::EventId;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Processing state of a logged event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventLogStatus {
    Received,
    Processed,
    Failed,
}

impl EventLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventLogStatus::Received => "RECEIVED",
            EventLogStatus::Processed => "PROCESSED",
            EventLogStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for EventLogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded for events whose payload could not be parsed.
pub const UNKNOWN_EVENT_TYPE: &str = "UNKNOWN";

/// One observed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventLog {
    pub id: Uuid,
    /// The envelope's event id; absent when the payload was malformed.
    pub event_id: Option<EventId>,
    /// Event type name, or [`UNKNOWN_EVENT_TYPE`] on parse failure.
    pub event_type: String,
    pub source_service: String,
    pub topic: String,
    /// Raw wire payload, kept verbatim for inspection.
    pub payload: String,
    pub status: EventLogStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl EventLog {
    pub fn received(
        event_id: EventId,
        event_type: impl Into<String>,
        source_service: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: Some(event_id),
            event_type: event_type.into(),
            source_service: source_service.into(),
            topic: topic.into(),
            payload: payload.into(),
            status: EventLogStatus::Received,
            created_at: Utc::now(),
            processed_at: None,
        }
    }

    /// A row for a payload that could not be parsed as an envelope.
    pub fn unparseable(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id: None,
            event_type: UNKNOWN_EVENT_TYPE.to_string(),
            source_service: UNKNOWN_EVENT_TYPE.to_string(),
            topic: topic.into(),
            payload: payload.into(),
            status: EventLogStatus::Failed,
            created_at: Utc::now(),
            processed_at: None,
        }
    }
}

/// Store for event log rows.
#[async_trait]
pub trait EventLogStore: Send + Sync {
    async fn append(&self, row: EventLog) -> EventLog;

    /// Marks a Received row Processed, stamping `processed_at`.
    async fn mark_processed(&self, id: Uuid);

    /// Most recent rows, newest first.
    async fn latest(&self, limit: usize) -> Vec<EventLog>;

    async fn find_by_type(&self, event_type: &str) -> Vec<EventLog>;

    async fn find_by_source(&self, source_service: &str) -> Vec<EventLog>;

    async fn count_by_type(&self) -> HashMap<String, usize>;

    async fn count_by_status(&self, status: EventLogStatus) -> usize;

    async fn len(&self) -> usize;
}

/// In-memory append-only store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventLogStore {
    rows: Arc<RwLock<Vec<EventLog>>>,
}

impl InMemoryEventLogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventLogStore for InMemoryEventLogStore {
    async fn append(&self, row: EventLog) -> EventLog {
        self.rows.write().await.push(row.clone());
        row
    }

    async fn mark_processed(&self, id: Uuid) {
        let mut rows = self.rows.write().await;
        if let Some(row) = rows.iter_mut().find(|r| r.id == id) {
            row.status = EventLogStatus::Processed;
            row.processed_at = Some(Utc::now());
        }
    }

    async fn latest(&self, limit: usize) -> Vec<EventLog> {
        let rows = self.rows.read().await;
        rows.iter().rev().take(limit).cloned().collect()
    }

    async fn find_by_type(&self, event_type: &str) -> Vec<EventLog> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.event_type == event_type)
            .cloned()
            .collect()
    }

    async fn find_by_source(&self, source_service: &str) -> Vec<EventLog> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.source_service == source_service)
            .cloned()
            .collect()
    }

    async fn count_by_type(&self) -> HashMap<String, usize> {
        let rows = self.rows.read().await;
        let mut counts = HashMap::new();
        for row in rows.iter() {
            *counts.entry(row.event_type.clone()).or_insert(0) += 1;
        }
        counts
    }

    async fn count_by_status(&self, status: EventLogStatus) -> usize {
        self.rows
            .read()
            .await
            .iter()
            .filter(|r| r.status == status)
            .count()
    }

    async fn len(&self) -> usize {
        self.rows.read().await.len()
    }
}
