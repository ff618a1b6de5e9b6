//! Polling relay delivering outbox events to registered handlers.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::{HandlerRegistry, OutboxStore, RetryPolicy, Result};

/// Relay tuning knobs.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Maximum events fetched per poll.
    pub batch_size: usize,
    /// Backoff and attempt bound applied to failing events.
    pub retry: RetryPolicy,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            retry: RetryPolicy::default(),
        }
    }
}

/// Counters reported by one relay pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Events whose handlers all succeeded.
    pub delivered: usize,
    /// Events that failed and will be retried.
    pub failed: usize,
    /// Events that exhausted their retries on this pass.
    pub dead_lettered: usize,
    /// Events skipped because their backoff has not elapsed.
    pub deferred: usize,
}

/// Polls unprocessed events and dispatches them to the handlers for their
/// type, in priority order.
///
/// An event is marked processed only when every handler succeeded; on any
/// failure the whole event is retried after backoff, so handlers must be
/// idempotent. Events that exhaust their retries stay unprocessed with the
/// final error recorded, which is what the dead-letter monitor counts.
pub struct OutboxRelay {
    store: Arc<dyn OutboxStore>,
    registry: Arc<HandlerRegistry>,
    config: RelayConfig,
}

impl OutboxRelay {
    /// Creates a relay over the given store and handler registry.
    pub fn new(
        store: Arc<dyn OutboxStore>,
        registry: Arc<HandlerRegistry>,
        config: RelayConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Runs one poll-and-dispatch pass.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RelayStats> {
        let batch = self
            .store
            .fetch_unprocessed(self.config.batch_size, self.config.retry.max_attempts)
            .await?;

        let mut stats = RelayStats::default();
        let now = Utc::now();

        for event in batch {
            if !self
                .config
                .retry
                .is_due(event.retry_count, event.last_attempt_at, now)
            {
                stats.deferred += 1;
                continue;
            }

            let handlers = self.registry.handlers_for(&event.event_type);
            let mut failures: Vec<String> = Vec::new();

            for handler in handlers {
                if let Err(e) = handler.handle(&event).await {
                    tracing::warn!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        handler = handler.name(),
                        error = %e,
                        "handler failed"
                    );
                    failures.push(format!("{}: {e}", handler.name()));
                }
            }

            if failures.is_empty() {
                self.store.mark_processed(event.id).await?;
                metrics::counter!("outbox_events_delivered_total").increment(1);
                stats.delivered += 1;
            } else {
                self.store
                    .record_failure(event.id, &failures.join("; "))
                    .await?;
                stats.failed += 1;

                if event.retry_count + 1 >= self.config.retry.max_attempts {
                    metrics::counter!("outbox_events_dead_lettered_total").increment(1);
                    tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        retries = event.retry_count + 1,
                        "event dead-lettered after exhausting retries"
                    );
                    stats.dead_lettered += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Spawns the relay loop. Abort the returned handle on shutdown.
    pub fn spawn(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "outbox relay pass failed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{EventHandler, InMemoryOutboxStore, OutboxError, OutboxEvent};

    struct CountingHandler {
        event_type: &'static str,
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl CountingHandler {
        fn new(event_type: &'static str, fail_first: usize) -> Arc<Self> {
            Arc::new(Self {
                event_type,
                calls: AtomicUsize::new(0),
                fail_first,
            })
        }
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        fn name(&self) -> &str {
            "counting"
        }

        fn event_type(&self) -> &str {
            self.event_type
        }

        async fn handle(&self, _event: &OutboxEvent) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(OutboxError::DeliveryFailed("transient".into()));
            }
            Ok(())
        }
    }

    fn relay_with(
        store: &InMemoryOutboxStore,
        registry: HandlerRegistry,
        max_attempts: u32,
    ) -> OutboxRelay {
        OutboxRelay::new(
            Arc::new(store.clone()),
            Arc::new(registry),
            RelayConfig {
                batch_size: 10,
                retry: RetryPolicy {
                    max_attempts,
                    base_delay: Duration::ZERO,
                    max_delay: Duration::ZERO,
                },
            },
        )
    }

    fn event(event_type: &str) -> OutboxEvent {
        OutboxEvent::new(event_type, "Order", "o-1", &serde_json::json!({})).unwrap()
    }

    #[tokio::test]
    async fn delivers_and_marks_processed() {
        let store = InMemoryOutboxStore::new();
        store.append(event("order.created")).await.unwrap();

        let handler = CountingHandler::new("order.created", 0);
        let mut registry = HandlerRegistry::new();
        registry.register(handler.clone());

        let stats = relay_with(&store, registry, 3).run_once().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert!(store.fetch_unprocessed(10, 3).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn event_without_handlers_is_acknowledged() {
        let store = InMemoryOutboxStore::new();
        store.append(event("nobody.cares")).await.unwrap();

        let stats = relay_with(&store, HandlerRegistry::new(), 3)
            .run_once()
            .await
            .unwrap();
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn flaky_handler_retries_until_success() {
        let store = InMemoryOutboxStore::new();
        let e = event("order.created");
        let id = e.id;
        store.append(e).await.unwrap();

        let handler = CountingHandler::new("order.created", 2);
        let mut registry = HandlerRegistry::new();
        registry.register(handler.clone());
        let relay = relay_with(&store, registry, 5);

        // Two failing passes, one succeeding pass.
        assert_eq!(relay.run_once().await.unwrap().failed, 1);
        assert_eq!(relay.run_once().await.unwrap().failed, 1);
        assert_eq!(relay.run_once().await.unwrap().delivered, 1);

        let stored = store.get(id).await.unwrap().unwrap();
        assert!(stored.processed);
        assert_eq!(stored.retry_count, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_dead_letter_the_event() {
        let store = InMemoryOutboxStore::new();
        store.append(event("order.created")).await.unwrap();

        let handler = CountingHandler::new("order.created", usize::MAX);
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        let relay = relay_with(&store, registry, 2);

        assert_eq!(relay.run_once().await.unwrap().failed, 1);
        let stats = relay.run_once().await.unwrap();
        assert_eq!(stats.dead_lettered, 1);

        // Dead letter is no longer polled.
        let stats = relay.run_once().await.unwrap();
        assert_eq!(stats, RelayStats::default());
        assert_eq!(store.dead_letter_count(2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_handlers_failure_does_not_block_the_other() {
        let store = InMemoryOutboxStore::new();
        let e = event("order.created");
        let id = e.id;
        store.append(e).await.unwrap();

        let good = CountingHandler::new("order.created", 0);
        let bad = CountingHandler::new("order.created", 1);
        let mut registry = HandlerRegistry::new();
        registry.register(good.clone());
        registry.register(bad.clone());
        let relay = relay_with(&store, registry, 5);

        // First pass: good succeeds, bad fails, event is retried whole.
        assert_eq!(relay.run_once().await.unwrap().failed, 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 1);

        // Second pass: both succeed; good saw the event twice, which is
        // why handlers must be idempotent.
        assert_eq!(relay.run_once().await.unwrap().delivered, 1);
        assert_eq!(good.calls.load(Ordering::SeqCst), 2);

        let stored = store.get(id).await.unwrap().unwrap();
        assert!(stored.error_message.as_deref().unwrap().contains("counting"));
    }

    #[tokio::test]
    async fn backoff_defers_recent_failures() {
        let store = InMemoryOutboxStore::new();
        store.append(event("order.created")).await.unwrap();

        let handler = CountingHandler::new("order.created", usize::MAX);
        let mut registry = HandlerRegistry::new();
        registry.register(handler);

        let relay = OutboxRelay::new(
            Arc::new(store.clone()),
            Arc::new(registry),
            RelayConfig {
                batch_size: 10,
                retry: RetryPolicy {
                    max_attempts: 5,
                    base_delay: Duration::from_secs(60),
                    max_delay: Duration::from_secs(60),
                },
            },
        );

        assert_eq!(relay.run_once().await.unwrap().failed, 1);
        // Immediately after a failure the event is inside its backoff.
        assert_eq!(relay.run_once().await.unwrap().deferred, 1);
    }
}
