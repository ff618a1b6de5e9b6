//! The outbox event row.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

/// Unique identifier for an outbox event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random event ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an event ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A domain event written in the same transaction as the state change it
/// announces, then relayed asynchronously to interested handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Unique identifier for this event.
    pub id: EventId,

    /// Event type, e.g. `"order.created"`, `"coupon.issued"`.
    pub event_type: String,

    /// Kind of aggregate the event belongs to, e.g. `"Order"`.
    pub aggregate_type: String,

    /// Identifier of the aggregate instance.
    pub aggregate_id: String,

    /// Serialized event payload.
    pub payload: serde_json::Value,

    /// Whether every registered handler has processed this event.
    pub processed: bool,

    /// Number of failed relay attempts so far.
    pub retry_count: u32,

    /// Error recorded by the most recent failed attempt.
    pub error_message: Option<String>,

    /// When the event was written.
    pub created_at: DateTime<Utc>,

    /// When the most recent relay attempt ran.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// When the event was fully processed.
    pub processed_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Creates a new unprocessed event with a serialized payload.
    pub fn new<P: Serialize>(
        event_type: impl Into<String>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl std::fmt::Display,
        payload: &P,
    ) -> Result<Self> {
        Ok(Self {
            id: EventId::new(),
            event_type: event_type.into(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.to_string(),
            payload: serde_json::to_value(payload)?,
            processed: false,
            retry_count: 0,
            error_message: None,
            created_at: Utc::now(),
            last_attempt_at: None,
            processed_at: None,
        })
    }

    /// Deserializes the payload into a concrete type.
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Returns true once `retry_count` has reached `max_retries`; such
    /// events are no longer polled and count as dead letters.
    pub fn is_dead_lettered(&self, max_retries: u32) -> bool {
        !self.processed && self.retry_count >= max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Payload {
        order_id: String,
        total_cents: i64,
    }

    #[test]
    fn new_event_is_unprocessed() {
        let payload = Payload {
            order_id: "o-1".into(),
            total_cents: 1200,
        };
        let event = OutboxEvent::new("order.created", "Order", "o-1", &payload).unwrap();

        assert!(!event.processed);
        assert_eq!(event.retry_count, 0);
        assert!(event.error_message.is_none());
        assert!(event.processed_at.is_none());
    }

    #[test]
    fn payload_roundtrip() {
        let payload = Payload {
            order_id: "o-2".into(),
            total_cents: 450,
        };
        let event = OutboxEvent::new("order.created", "Order", "o-2", &payload).unwrap();
        let decoded: Payload = event.payload_as().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn dead_letter_requires_exhausted_retries() {
        let mut event =
            OutboxEvent::new("order.created", "Order", "o-3", &serde_json::json!({})).unwrap();
        assert!(!event.is_dead_lettered(3));

        event.retry_count = 3;
        assert!(event.is_dead_lettered(3));

        event.processed = true;
        assert!(!event.is_dead_lettered(3));
    }
}
