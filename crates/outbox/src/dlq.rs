//! Dead-letter monitor.

use std::sync::Arc;
use std::time::Duration;

use crate::{OutboxStore, Result};

/// Periodically counts unresolved dead letters and raises an alert once
/// the threshold is crossed.
///
/// The alert is level-triggered: while the count stays above the
/// threshold, every pass logs at error level and refreshes the gauge, so a
/// restarted process re-alerts.
pub struct DeadLetterMonitor {
    store: Arc<dyn OutboxStore>,
    max_retries: u32,
    alert_threshold: u64,
}

impl DeadLetterMonitor {
    /// Creates a monitor over the given store.
    pub fn new(store: Arc<dyn OutboxStore>, max_retries: u32, alert_threshold: u64) -> Self {
        Self {
            store,
            max_retries,
            alert_threshold,
        }
    }

    /// Counts dead letters, updating the gauge and alerting if needed.
    /// Returns the current count.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<u64> {
        let count = self.store.dead_letter_count(self.max_retries).await?;
        metrics::gauge!("outbox_dead_letters").set(count as f64);

        if count >= self.alert_threshold {
            metrics::counter!("outbox_dead_letter_alerts_total").increment(1);
            tracing::error!(
                count,
                threshold = self.alert_threshold,
                "dead-lettered outbox events require attention"
            );
        }

        Ok(count)
    }

    /// Spawns the monitor loop. Abort the returned handle on shutdown.
    pub fn spawn(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "dead-letter monitor pass failed");
                }
            }
        })
    }
}
