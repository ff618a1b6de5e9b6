//! Event handler trait and registry.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{OutboxEvent, Result};

/// A consumer of relayed outbox events.
///
/// Each handler's outcome is independent: the relay never rolls back one
/// handler's effect because another failed. Handlers must therefore be
/// idempotent, since a partially-failed event is redelivered whole.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Stable handler name, used in logs and failure records.
    fn name(&self) -> &str;

    /// The event type this handler consumes.
    fn event_type(&self) -> &str;

    /// Dispatch priority; lower runs first. Used where causal order
    /// between handlers matters.
    fn priority(&self) -> i32 {
        100
    }

    /// Processes one event.
    async fn handle(&self, event: &OutboxEvent) -> Result<()>;
}

/// Registry of handlers keyed by event type, ordered by priority.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Vec<Arc<dyn EventHandler>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for its event type. Handlers for the same type
    /// are kept sorted by ascending priority; ties keep registration order.
    pub fn register(&mut self, handler: Arc<dyn EventHandler>) {
        let list = self
            .handlers
            .entry(handler.event_type().to_string())
            .or_default();
        list.push(handler);
        list.sort_by_key(|h| h.priority());
    }

    /// Returns the handlers for an event type, in dispatch order.
    pub fn handlers_for(&self, event_type: &str) -> &[Arc<dyn EventHandler>] {
        self.handlers
            .get(event_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns the total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }
}
