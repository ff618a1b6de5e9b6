//! The issuance worker: drains admission queues and performs grants.

use std::sync::Arc;
use std::time::Duration;

use common::{CouponId, TicketId, UserCouponId, UserId};
use keyed_lock::LockRegistry;
use outbox::{OutboxEvent, OutboxStore};
use serde::{Deserialize, Serialize};

use crate::{
    CouponError, CouponStore, QueueStore, Result, TicketState, UserCoupon, UserCouponStore,
};

/// Issuance tuning knobs.
#[derive(Debug, Clone)]
pub struct IssuanceConfig {
    /// Maximum tickets popped per coupon per pass.
    pub batch_size: usize,
    /// Bounded wait for the per-coupon lock.
    pub lock_wait: Duration,
}

impl Default for IssuanceConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            lock_wait: Duration::from_secs(3),
        }
    }
}

/// Counters reported by one drain pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    /// Tickets completed with a grant.
    pub completed: usize,
    /// Tickets failed with a recorded reason.
    pub failed: usize,
}

/// Outbox payload for a successful grant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouponIssuedPayload {
    pub user_coupon_id: UserCouponId,
    pub user_id: UserId,
    pub coupon_id: CouponId,
    pub position: u64,
}

/// Drains waiting tickets in position order and performs the grants.
///
/// Decouples admission (accepting the request) from fulfillment: by the
/// time a ticket reaches the worker it already passed the capacity gate,
/// so the lock-bearing grant step sees bounded demand. One ticket's
/// failure never blocks the rest of the batch.
pub struct IssuanceWorker {
    coupons: Arc<dyn CouponStore>,
    queue: Arc<dyn QueueStore>,
    grants: Arc<dyn UserCouponStore>,
    outbox: Arc<dyn OutboxStore>,
    locks: Arc<LockRegistry>,
    config: IssuanceConfig,
}

impl IssuanceWorker {
    /// Creates a worker over the given stores.
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        queue: Arc<dyn QueueStore>,
        grants: Arc<dyn UserCouponStore>,
        outbox: Arc<dyn OutboxStore>,
        locks: Arc<LockRegistry>,
        config: IssuanceConfig,
    ) -> Self {
        Self {
            coupons,
            queue,
            grants,
            outbox,
            locks,
            config,
        }
    }

    /// Drains one batch for one coupon.
    #[tracing::instrument(skip(self))]
    pub async fn drain_coupon(&self, coupon_id: CouponId) -> Result<DrainStats> {
        let ticket_ids = self
            .queue
            .pop_waiting(coupon_id, self.config.batch_size)
            .await?;

        let mut stats = DrainStats::default();
        for ticket_id in ticket_ids {
            match self.fulfill_ticket(ticket_id).await? {
                Some(true) => stats.completed += 1,
                Some(false) => stats.failed += 1,
                // Ticket vanished (TTL collection) between pop and fetch.
                None => {}
            }
        }

        if stats != DrainStats::default() {
            tracing::info!(
                %coupon_id,
                completed = stats.completed,
                failed = stats.failed,
                "drained admission batch"
            );
        }
        Ok(stats)
    }

    /// Processes a single popped ticket. Returns Some(true) on a grant,
    /// Some(false) on a recorded failure, None if the ticket was gone.
    async fn fulfill_ticket(&self, ticket_id: TicketId) -> Result<Option<bool>> {
        let Some(mut ticket) = self.queue.get_ticket(ticket_id).await? else {
            return Ok(None);
        };
        if ticket.state != TicketState::Waiting {
            return Ok(None);
        }

        ticket.start_processing()?;
        self.queue.update_ticket(ticket.clone()).await?;

        match self.grant(&ticket.user_id, ticket.coupon_id, ticket.position).await {
            Ok(grant_id) => {
                ticket.complete(grant_id)?;
                self.queue.update_ticket(ticket).await?;
                metrics::counter!("coupons_issued_total").increment(1);
                Ok(Some(true))
            }
            Err(e) => {
                tracing::warn!(
                    %ticket_id,
                    user_id = %ticket.user_id,
                    error = %e,
                    "coupon grant failed"
                );
                ticket.fail(e.to_string())?;
                self.queue.update_ticket(ticket).await?;
                metrics::counter!("coupon_grants_failed_total").increment(1);
                Ok(Some(false))
            }
        }
    }

    /// The actual grant, under the coupon's lock: capacity re-check,
    /// version-guarded increment, grant insert, and the outbox event, all
    /// in one mutation scope.
    async fn grant(
        &self,
        user_id: &UserId,
        coupon_id: CouponId,
        position: u64,
    ) -> Result<UserCouponId> {
        let _guard = self
            .locks
            .acquire(&format!("coupon:{coupon_id}"), self.config.lock_wait)
            .await?;

        let coupon = self
            .coupons
            .get(coupon_id)
            .await?
            .ok_or(CouponError::CouponNotFound(coupon_id))?;
        let updated = coupon.issue_one()?;

        if self.grants.has_non_expired(*user_id, coupon_id).await? {
            return Err(CouponError::AlreadyIssued);
        }

        self.coupons.update_versioned(updated).await?;

        let grant = UserCoupon::new(*user_id, &coupon);
        let grant_id = grant.id;
        self.grants.insert(grant.clone()).await?;

        let payload = CouponIssuedPayload {
            user_coupon_id: grant_id,
            user_id: *user_id,
            coupon_id,
            position,
        };
        self.outbox
            .append(OutboxEvent::new(
                "coupon.issued",
                "UserCoupon",
                grant_id,
                &payload,
            )?)
            .await?;

        Ok(grant_id)
    }

    /// Drains every coupon that currently has waiting tickets.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<DrainStats> {
        let mut total = DrainStats::default();
        for coupon_id in self.queue.waiting_coupons().await? {
            let stats = self.drain_coupon(coupon_id).await?;
            total.completed += stats.completed;
            total.failed += stats.failed;
        }
        Ok(total)
    }

    /// Spawns the worker loop. Abort the returned handle on shutdown.
    pub fn spawn(self: Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "issuance pass failed");
                }
            }
        })
    }
}
