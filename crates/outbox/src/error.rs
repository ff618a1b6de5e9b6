//! Outbox error types.

use thiserror::Error;

use crate::event::EventId;

/// Errors that can occur in the outbox pipeline.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The referenced outbox event does not exist.
    #[error("Outbox event not found: {0}")]
    EventNotFound(EventId),

    /// A handler reported a failure for an event.
    #[error("Handler '{handler}' failed: {reason}")]
    Handler { handler: String, reason: String },

    /// The consumer's circuit breaker is open; delivery was deferred.
    #[error("Circuit breaker open, delivery deferred")]
    BreakerOpen,

    /// Delivery to an external system failed (retryable).
    #[error("External delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Convenience type alias for outbox results.
pub type Result<T> = std::result::Result<T, OutboxError>;
