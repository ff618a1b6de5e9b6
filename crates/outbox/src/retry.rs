//! Bounded exponential backoff policy for relay attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;

/// Retry policy: exponential backoff with jitter, bounded attempt count.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Failed attempts after which an event is dead-lettered.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Returns the backoff before attempt number `attempt` (0-based count
    /// of failures so far), doubling each time up to `max_delay`, with up
    /// to 25% random jitter added to spread synchronized retries.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.min(16);
        let base = self
            .base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 4);
        base + Duration::from_millis(jitter)
    }

    /// Returns true when an event that last failed at `last_attempt_at`
    /// with `retry_count` prior failures is due for another attempt.
    pub fn is_due(
        &self,
        retry_count: u32,
        last_attempt_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        match last_attempt_at {
            None => true,
            Some(last) => {
                let backoff = self
                    .base_delay
                    .saturating_mul(1u32 << retry_count.saturating_sub(1).min(16))
                    .min(self.max_delay);
                let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
                elapsed >= backoff
            }
        }
    }
}
