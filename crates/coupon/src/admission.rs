//! The bounded admission queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CouponId, TicketId, UserId};
use keyed_lock::LockRegistry;

use crate::{
    CouponError, CouponStore, QueueStore, QueueTicket, Result, TicketState,
};

/// Admission tuning knobs.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Bounded wait for the per-coupon lock.
    pub lock_wait: Duration,
    /// TTL on ticket blobs; stale tickets expire and are collected.
    pub ticket_ttl: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            lock_wait: Duration::from_secs(3),
            ticket_ttl: Duration::from_secs(3600),
        }
    }
}

/// Serializes flash-sale coupon requests into a bounded FIFO per coupon.
///
/// Admission control happens here: the waiting list is sized at the
/// coupon's `total_quantity`, so excess demand is rejected at entry with
/// [`CouponError::QueueFull`] instead of piling up unbounded. Rejecting
/// is synchronous; fulfillment is the issuance worker's job.
pub struct AdmissionQueue {
    coupons: Arc<dyn CouponStore>,
    queue: Arc<dyn QueueStore>,
    locks: Arc<LockRegistry>,
    config: AdmissionConfig,
}

impl AdmissionQueue {
    /// Creates an admission queue over the given stores.
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        queue: Arc<dyn QueueStore>,
        locks: Arc<LockRegistry>,
        config: AdmissionConfig,
    ) -> Self {
        Self {
            coupons,
            queue,
            locks,
            config,
        }
    }

    /// Admits a user into a coupon's queue.
    ///
    /// Under the coupon's lock: rejects duplicates, test-and-pushes into
    /// the list bounded at `total_quantity`, assigns a monotonic position,
    /// and persists the ticket with a TTL.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(&self, user_id: UserId, coupon_id: CouponId) -> Result<QueueTicket> {
        let coupon = self
            .coupons
            .get(coupon_id)
            .await?
            .ok_or(CouponError::CouponNotFound(coupon_id))?;
        if !coupon.is_active(Utc::now()) {
            return Err(CouponError::CouponNotActive);
        }

        let _guard = self
            .locks
            .acquire(&format!("coupon:{coupon_id}"), self.config.lock_wait)
            .await?;

        if let Some(existing) = self.queue.ticket_for_user(coupon_id, user_id).await? {
            match existing.state {
                TicketState::Waiting | TicketState::Processing => {
                    return Err(CouponError::AlreadyInQueue);
                }
                TicketState::Completed => return Err(CouponError::AlreadyIssued),
                // Failed and Expired tickets free their slot; re-enqueue
                // is allowed.
                TicketState::Failed | TicketState::Expired => {}
            }
        }

        let ticket_id = TicketId::new();
        let admitted = self
            .queue
            .try_push_waiting(coupon_id, ticket_id, coupon.total_quantity as usize)
            .await?;
        if !admitted {
            metrics::counter!("admissions_rejected_total").increment(1);
            return Err(CouponError::QueueFull {
                capacity: coupon.total_quantity,
            });
        }

        let position = self.queue.next_position(coupon_id).await?;
        let ticket = QueueTicket::new(ticket_id, user_id, coupon_id, position);
        self.queue
            .put_ticket(ticket.clone(), self.config.ticket_ttl)
            .await?;

        metrics::counter!("admissions_accepted_total").increment(1);
        tracing::debug!(%ticket_id, position, "ticket admitted");
        Ok(ticket)
    }

    /// Returns a ticket's status by ID.
    pub async fn ticket(&self, ticket_id: TicketId) -> Result<Option<QueueTicket>> {
        self.queue.get_ticket(ticket_id).await
    }

    /// Returns the user's ticket for a coupon, if any.
    pub async fn ticket_for(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<Option<QueueTicket>> {
        self.queue.ticket_for_user(coupon_id, user_id).await
    }

    /// Returns the coupon's current waiting-list depth.
    pub async fn queue_depth(&self, coupon_id: CouponId) -> Result<usize> {
        self.queue.depth(coupon_id).await
    }

    /// Expires stale tickets. Returns how many lapsed.
    #[tracing::instrument(skip(self))]
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<usize> {
        let expired = self.queue.expire_stale(now).await?;
        if !expired.is_empty() {
            metrics::counter!("tickets_expired_total").increment(expired.len() as u64);
            tracing::info!(count = expired.len(), "expired stale queue tickets");
        }
        Ok(expired.len())
    }
}
