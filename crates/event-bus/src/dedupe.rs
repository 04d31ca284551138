//! Consumer-side duplicate detection.

use std::collections::HashSet;
use std::sync::Arc;

use common::EventId;
use tokio::sync::RwLock;

/// Tracks the event ids a consumer has processed to completion.
///
/// At-least-once delivery means the same envelope can arrive again after a
/// redelivery or a rebalance. Consumers check [`contains`] on entry to skip
/// duplicates and call [`mark_processed`] only once the work has completed,
/// so an envelope that failed with a retry verdict stays eligible for its
/// redelivery.
///
/// [`contains`]: ProcessedEvents::contains
/// [`mark_processed`]: ProcessedEvents::mark_processed
#[derive(Debug, Clone, Default)]
pub struct ProcessedEvents {
    seen: Arc<RwLock<HashSet<EventId>>>,
}

impl ProcessedEvents {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an event id as processed. Returns `true` if the id was new,
    /// `false` if it had been processed before.
    pub async fn mark_processed(&self, event_id: EventId) -> bool {
        self.seen.write().await.insert(event_id)
    }

    /// Returns true if the event id has already been processed.
    pub async fn contains(&self, event_id: EventId) -> bool {
        self.seen.read().await.contains(&event_id)
    }

    /// Returns the number of distinct processed events.
    pub async fn len(&self) -> usize {
        self.seen.read().await.len()
    }

    /// Returns true if no events have been processed.
    pub async fn is_empty(&self) -> bool {
        self.seen.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_mark_returns_true_second_false() {
        let processed = ProcessedEvents::new();
        let id = EventId::new();

        assert!(processed.mark_processed(id).await);
        assert!(!processed.mark_processed(id).await);
        assert!(processed.contains(id).await);
        assert_eq!(processed.len().await, 1);
    }

    #[tokio::test]
    async fn distinct_ids_tracked_independently() {
        let processed = ProcessedEvents::new();
        assert!(processed.mark_processed(EventId::new()).await);
        assert!(processed.mark_processed(EventId::new()).await);
        assert_eq!(processed.len().await, 2);
    }
}
