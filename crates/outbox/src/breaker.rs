//! Circuit breaker guarding external deliveries.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Deliveries flow normally.
    Closed,
    /// Deliveries are rejected until the cooldown elapses.
    Open,
    /// One probe delivery is allowed through.
    HalfOpen,
}

#[derive(Debug)]
enum Inner {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Trips open after `failure_threshold` consecutive failures; after
/// `cooldown` a single probe is let through, and its outcome decides
/// whether the breaker closes again or re-opens.
pub struct CircuitBreaker {
    failure_threshold: u32,
    cooldown: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker.
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            failure_threshold,
            cooldown,
            inner: Mutex::new(Inner::Closed { failures: 0 }),
        }
    }

    /// Returns true if a delivery attempt may proceed. An open breaker
    /// whose cooldown has elapsed transitions to half-open and admits the
    /// caller as the probe.
    pub fn call_allowed(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match &*inner {
            Inner::Closed { .. } | Inner::HalfOpen => true,
            Inner::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    *inner = Inner::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a successful delivery, closing the breaker.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::Closed { failures: 0 };
    }

    /// Records a failed delivery. A half-open probe failure re-opens
    /// immediately; closed-state failures accumulate toward the threshold.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match &mut *inner {
            Inner::Closed { failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    metrics::counter!("circuit_breaker_opened_total").increment(1);
                    tracing::warn!("circuit breaker opened");
                    *inner = Inner::Open {
                        since: Instant::now(),
                    };
                }
            }
            Inner::HalfOpen | Inner::Open { .. } => {
                *inner = Inner::Open {
                    since: Instant::now(),
                };
            }
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> BreakerState {
        match &*self.inner.lock().unwrap() {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { .. } => BreakerState::Open,
            Inner::HalfOpen => BreakerState::HalfOpen,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.call_allowed());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.call_allowed());
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));

        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_probe_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);

        breaker.record_failure();
        // Cooldown of zero: next check transitions to half-open.
        assert!(breaker.call_allowed());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn failed_probe_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);

        breaker.record_failure();
        assert!(breaker.call_allowed());
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
