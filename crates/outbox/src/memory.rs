//! In-memory outbox store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{EventId, OutboxError, OutboxEvent, OutboxStore, Result};

/// In-memory outbox store used by the default wiring and the tests.
///
/// Events live in insertion order, which doubles as creation order.
#[derive(Clone, Default)]
pub struct InMemoryOutboxStore {
    events: Arc<RwLock<Vec<OutboxEvent>>>,
}

impl InMemoryOutboxStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of events stored.
    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Returns all events, for test assertions.
    pub async fn all(&self) -> Vec<OutboxEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl OutboxStore for InMemoryOutboxStore {
    async fn append(&self, event: OutboxEvent) -> Result<()> {
        self.events.write().await.push(event);
        Ok(())
    }

    async fn fetch_unprocessed(&self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| !e.processed && e.retry_count < max_retries)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_processed(&self, id: EventId) -> Result<()> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(OutboxError::EventNotFound(id))?;
        event.processed = true;
        event.processed_at = Some(Utc::now());
        Ok(())
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<()> {
        let mut events = self.events.write().await;
        let event = events
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(OutboxError::EventNotFound(id))?;
        event.retry_count += 1;
        event.error_message = Some(error.to_string());
        event.last_attempt_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, id: EventId) -> Result<Option<OutboxEvent>> {
        Ok(self.events.read().await.iter().find(|e| e.id == id).cloned())
    }

    async fn dead_letter_count(&self, max_retries: u32) -> Result<u64> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.is_dead_lettered(max_retries))
            .count() as u64)
    }
}
