//! Idempotent external delivery consumer.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    CircuitBreaker, EventHandler, IdempotencyStore, OutboxError, OutboxEvent, Result,
};

/// Seam to the downstream system a delivery forwards events to.
#[async_trait]
pub trait ExternalPublisher: Send + Sync {
    /// Forwards one event. Errors are treated as transient and retried by
    /// the relay within its attempt budget.
    async fn publish(&self, event: &OutboxEvent) -> Result<()>;
}

/// Event handler that forwards events to an external system with
/// exactly-once-in-effect semantics.
///
/// Before publishing it claims an idempotency key derived from the event;
/// a lost claim means the delivery already happened and is acknowledged as
/// a no-op. A deferred (breaker open) or failed publish releases the claim
/// so the next attempt is not mistaken for a duplicate.
pub struct IdempotentDelivery<P> {
    name: String,
    event_type: String,
    priority: i32,
    publisher: P,
    idempotency: Arc<dyn IdempotencyStore>,
    breaker: Arc<CircuitBreaker>,
    retention: Duration,
}

impl<P: ExternalPublisher> IdempotentDelivery<P> {
    /// Creates a delivery consumer for one event type.
    pub fn new(
        name: impl Into<String>,
        event_type: impl Into<String>,
        publisher: P,
        idempotency: Arc<dyn IdempotencyStore>,
        breaker: Arc<CircuitBreaker>,
        retention: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            event_type: event_type.into(),
            priority: 100,
            publisher,
            idempotency,
            breaker,
            retention,
        }
    }

    /// Overrides the dispatch priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Key identifying the logical delivery, e.g. `"<order-id>:order.created"`.
    fn delivery_key(&self, event: &OutboxEvent) -> String {
        format!("{}:{}", event.aggregate_id, event.event_type)
    }
}

#[async_trait]
impl<P: ExternalPublisher> EventHandler for IdempotentDelivery<P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    async fn handle(&self, event: &OutboxEvent) -> Result<()> {
        let key = self.delivery_key(event);

        if !self.idempotency.claim(&key, self.retention).await? {
            metrics::counter!("deliveries_deduplicated_total").increment(1);
            tracing::debug!(%key, "duplicate delivery, acknowledged without effect");
            return Ok(());
        }

        if !self.breaker.call_allowed() {
            self.idempotency.release(&key).await?;
            return Err(OutboxError::BreakerOpen);
        }

        match self.publisher.publish(event).await {
            Ok(()) => {
                self.breaker.record_success();
                metrics::counter!("deliveries_published_total").increment(1);
                Ok(())
            }
            Err(e) => {
                self.breaker.record_failure();
                self.idempotency.release(&key).await?;
                Err(e)
            }
        }
    }
}

/// Publisher that records events in memory, used in tests and as the
/// default wiring's downstream stand-in.
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<OutboxEvent>>>,
    fail: Arc<std::sync::atomic::AtomicBool>,
}

impl RecordingPublisher {
    /// Creates a new recording publisher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the publisher to fail every publish call.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Returns the number of events published so far.
    pub async fn published_count(&self) -> usize {
        self.published.lock().await.len()
    }

    /// Returns the published events.
    pub async fn published(&self) -> Vec<OutboxEvent> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl ExternalPublisher for RecordingPublisher {
    async fn publish(&self, event: &OutboxEvent) -> Result<()> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(OutboxError::DeliveryFailed("publisher down".into()));
        }
        self.published.lock().await.push(event.clone());
        Ok(())
    }
}
