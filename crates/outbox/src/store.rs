//! Storage seam for outbox events.

use async_trait::async_trait;

use crate::{EventId, OutboxEvent, Result};

/// Persistence interface for the outbox table.
///
/// `append` is called by domain services while they hold the lock (or
/// database transaction) guarding the originating state change, which is
/// what makes publication atomic with the change itself.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends a new event row.
    async fn append(&self, event: OutboxEvent) -> Result<()>;

    /// Returns up to `limit` unprocessed events in creation order,
    /// excluding events whose `retry_count` has reached `max_retries`
    /// (those stay in place as dead letters).
    async fn fetch_unprocessed(&self, limit: usize, max_retries: u32) -> Result<Vec<OutboxEvent>>;

    /// Marks an event as fully processed.
    async fn mark_processed(&self, id: EventId) -> Result<()>;

    /// Records a failed relay attempt: increments `retry_count`, stores
    /// the error message and the attempt timestamp.
    async fn record_failure(&self, id: EventId, error: &str) -> Result<()>;

    /// Returns one event by ID.
    async fn get(&self, id: EventId) -> Result<Option<OutboxEvent>>;

    /// Counts unresolved dead letters: unprocessed events with
    /// `retry_count >= max_retries`.
    async fn dead_letter_count(&self, max_retries: u32) -> Result<u64>;
}
