//! Reservation expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use inventory::StockLedger;

use crate::checkout::CheckoutService;
use crate::error::Result;

/// Periodically sweeps lapsed stock holds and expires their pending
/// orders.
///
/// The ledger deduplicates the order list per sweep, and
/// [`CheckoutService::expire_order`] skips terminal orders, so an order is
/// expired at most once no matter how many of its holds lapse or how
/// often sweeps overlap.
pub struct ReservationSweeper {
    ledger: Arc<StockLedger>,
    checkout: Arc<CheckoutService>,
}

impl ReservationSweeper {
    /// Creates a sweeper over the ledger and checkout service.
    pub fn new(ledger: Arc<StockLedger>, checkout: Arc<CheckoutService>) -> Self {
        Self { ledger, checkout }
    }

    /// Runs one sweep. Returns how many orders were expired.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<usize> {
        let outcome = self.ledger.sweep_expired(Utc::now()).await?;

        let mut expired_orders = 0;
        for order_id in outcome.orders_to_expire {
            if self.checkout.expire_order(order_id).await?.is_some() {
                expired_orders += 1;
            }
        }
        Ok(expired_orders)
    }

    /// Spawns the sweep loop. Abort the returned handle on shutdown.
    pub fn spawn(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "reservation sweep failed");
                }
            }
        })
    }
}
