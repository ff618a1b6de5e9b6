//! Process-wide mutual exclusion by string key.
//!
//! Every shared counter in the system (`issued_quantity`, reserved stock,
//! queue positions) is mutated under a lock scoped to the owning entity's
//! id, so two different coupons or products never contend on each other.
//!
//! The registry is an injected value created at process start, never a
//! global. In a multi-instance deployment it must be replaced by a
//! distributed mutex client (lease expiry, fencing) honoring the same
//! contract: bounded wait, then `LockError::AcquisitionTimeout`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Errors produced by the lock coordinator.
#[derive(Debug, Error)]
pub enum LockError {
    /// The lock was not acquired within the caller's wait budget.
    #[error("lock on '{key}' not acquired within {waited:?}")]
    AcquisitionTimeout { key: String, waited: Duration },
}

struct LockEntry {
    lock: Arc<Mutex<()>>,
    last_used: Instant,
}

/// Registry mapping each key to a mutually-exclusive section.
///
/// Concurrent callers on different keys never block each other. Entries
/// that are idle and unheld are removed by [`LockRegistry::sweep`].
#[derive(Default)]
pub struct LockRegistry {
    entries: StdMutex<HashMap<String, LockEntry>>,
}

/// Guard holding a key's lock; released on drop.
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl KeyGuard {
    /// Returns the key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl LockRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, waiting at most `wait`.
    pub async fn acquire(&self, key: &str, wait: Duration) -> Result<KeyGuard, LockError> {
        let lock = {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(key.to_string()).or_insert_with(|| LockEntry {
                lock: Arc::new(Mutex::new(())),
                last_used: Instant::now(),
            });
            entry.last_used = Instant::now();
            Arc::clone(&entry.lock)
        };

        match tokio::time::timeout(wait, lock.lock_owned()).await {
            Ok(guard) => Ok(KeyGuard {
                key: key.to_string(),
                _guard: guard,
            }),
            Err(_) => {
                metrics::counter!("lock_acquisition_timeouts_total").increment(1);
                tracing::warn!(key, ?wait, "lock acquisition timed out");
                Err(LockError::AcquisitionTimeout {
                    key: key.to_string(),
                    waited: wait,
                })
            }
        }
    }

    /// Runs `action` while holding the lock for `key`.
    ///
    /// Fails with [`LockError::AcquisitionTimeout`] if the lock is not
    /// acquired within `wait`; the action is then never started.
    pub async fn with_lock<F, Fut, T>(
        &self,
        key: &str,
        wait: Duration,
        action: F,
    ) -> Result<T, LockError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key, wait).await?;
        Ok(action().await)
    }

    /// Returns the number of keys currently tracked.
    pub fn entry_count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Removes entries that are unheld and idle for at least `idle_for`.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, idle_for: Duration) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|_, entry| {
            Arc::strong_count(&entry.lock) > 1 || entry.last_used.elapsed() < idle_for
        });
        before - entries.len()
    }

    /// Spawns a periodic sweep of idle entries. Abort the returned handle
    /// on shutdown.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        idle_for: Duration,
    ) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = registry.sweep(idle_for);
                if removed > 0 {
                    tracing::debug!(removed, "swept idle lock entries");
                }
            }
        })
    }
}
