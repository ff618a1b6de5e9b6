//! Idempotency-key claims for exactly-once-in-effect consumption.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;

/// Default claim retention window.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Claim store guarding consumers against re-applying a delivery.
///
/// A claim is a test-and-set: the first caller wins and performs the side
/// effect; later callers see `false` and treat the delivery as a known
/// duplicate. Claims expire after their TTL so the store stays bounded.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Atomically claims `key` for `ttl`. Returns false if an unexpired
    /// claim already exists.
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Releases a claim, allowing a future attempt to win it again. Used
    /// when the side effect did not actually happen (deferred or failed).
    async fn release(&self, key: &str) -> Result<()>;

    /// Drops expired claims.
    async fn purge_expired(&self) -> Result<usize>;
}

/// In-memory idempotency store.
#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    claims: Arc<RwLock<HashMap<String, Instant>>>,
}

impl InMemoryIdempotencyStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live claims.
    pub async fn claim_count(&self) -> usize {
        self.claims.read().await.len()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn claim(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut claims = self.claims.write().await;
        let now = Instant::now();
        if let Some(expires_at) = claims.get(key)
            && *expires_at > now
        {
            return Ok(false);
        }
        claims.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn release(&self, key: &str) -> Result<()> {
        self.claims.write().await.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let mut claims = self.claims.write().await;
        let now = Instant::now();
        let before = claims.len();
        claims.retain(|_, expires_at| *expires_at > now);
        Ok(before - claims.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn first_claim_wins_second_loses() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.claim("order-1:paid", TTL).await.unwrap());
        assert!(!store.claim("order-1:paid", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn distinct_keys_are_independent() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.claim("a", TTL).await.unwrap());
        assert!(store.claim("b", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn release_reopens_the_key() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.claim("k", TTL).await.unwrap());
        store.release("k").await.unwrap();
        assert!(store.claim("k", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn expired_claims_can_be_retaken() {
        let store = InMemoryIdempotencyStore::new();
        assert!(store.claim("k", Duration::ZERO).await.unwrap());
        assert!(store.claim("k", TTL).await.unwrap());
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let store = InMemoryIdempotencyStore::new();
        store.claim("old", Duration::ZERO).await.unwrap();
        store.claim("fresh", TTL).await.unwrap();

        let purged = store.purge_expired().await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.claim_count().await, 1);
    }
}
