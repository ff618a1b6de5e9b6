//! Storage seams for coupons, grants, and the admission queue.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use common::{CouponId, TicketId, UserCouponId, UserId};
use tokio::sync::RwLock;

use crate::{Coupon, CouponError, QueueTicket, Result, TicketState, UserCoupon, UserCouponState};

/// Persistence interface for coupon campaigns.
#[async_trait]
pub trait CouponStore: Send + Sync {
    /// Inserts a new campaign.
    async fn insert(&self, coupon: Coupon) -> Result<()>;

    /// Returns a campaign by ID.
    async fn get(&self, id: CouponId) -> Result<Option<Coupon>>;

    /// Replaces a campaign, enforcing the optimistic version: the update
    /// only succeeds if the stored version is exactly one behind.
    async fn update_versioned(&self, coupon: Coupon) -> Result<()>;
}

/// Persistence interface for user-coupon grants.
#[async_trait]
pub trait UserCouponStore: Send + Sync {
    /// Inserts a grant, rejecting a second non-expired grant for the same
    /// (user, coupon) pair with [`CouponError::AlreadyIssued`].
    async fn insert(&self, grant: UserCoupon) -> Result<()>;

    /// Returns a grant by ID.
    async fn get(&self, id: UserCouponId) -> Result<Option<UserCoupon>>;

    /// Returns the user's redeemable grant for a coupon, if any.
    async fn redeemable_for(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<Option<UserCoupon>>;

    /// Returns true if the user holds any non-expired grant for the coupon.
    async fn has_non_expired(&self, user_id: UserId, coupon_id: CouponId) -> Result<bool>;

    /// Replaces a grant.
    async fn update(&self, grant: UserCoupon) -> Result<()>;

    /// Expires Issued grants past their validity. Returns how many lapsed.
    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Admission queue storage: a bounded waiting list, ticket blobs with a
/// TTL, a user index for duplicate detection, and a monotonic position
/// counter, all per coupon.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Atomically pushes a ticket onto the waiting list unless it already
    /// holds `capacity` entries. Returns false (mutating nothing) when
    /// full.
    async fn try_push_waiting(
        &self,
        coupon_id: CouponId,
        ticket_id: TicketId,
        capacity: usize,
    ) -> Result<bool>;

    /// Pops up to `max` tickets from the head of the waiting list (lowest
    /// positions first).
    async fn pop_waiting(&self, coupon_id: CouponId, max: usize) -> Result<Vec<TicketId>>;

    /// Returns the current waiting-list depth.
    async fn depth(&self, coupon_id: CouponId) -> Result<usize>;

    /// Returns the next position from the coupon's monotonic counter.
    async fn next_position(&self, coupon_id: CouponId) -> Result<u64>;

    /// Persists a ticket blob with a TTL and indexes it by (coupon, user).
    async fn put_ticket(&self, ticket: QueueTicket, ttl: Duration) -> Result<()>;

    /// Returns a ticket by ID.
    async fn get_ticket(&self, id: TicketId) -> Result<Option<QueueTicket>>;

    /// Replaces a ticket blob, keeping its TTL.
    async fn update_ticket(&self, ticket: QueueTicket) -> Result<()>;

    /// Returns the ticket indexed for (coupon, user), if any.
    async fn ticket_for_user(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> Result<Option<QueueTicket>>;

    /// Expires lapsed WAITING tickets (removing them from the waiting list
    /// and user index) and garbage-collects lapsed terminal blobs.
    /// Returns the tickets that were expired.
    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<QueueTicket>>;

    /// Returns the coupons that currently have waiting tickets.
    async fn waiting_coupons(&self) -> Result<Vec<CouponId>>;
}

// --- In-memory implementations ---

/// In-memory coupon store.
#[derive(Clone, Default)]
pub struct InMemoryCouponStore {
    coupons: Arc<RwLock<HashMap<CouponId, Coupon>>>,
}

impl InMemoryCouponStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CouponStore for InMemoryCouponStore {
    async fn insert(&self, coupon: Coupon) -> Result<()> {
        self.coupons.write().await.insert(coupon.id, coupon);
        Ok(())
    }

    async fn get(&self, id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.coupons.read().await.get(&id).cloned())
    }

    async fn update_versioned(&self, coupon: Coupon) -> Result<()> {
        let mut coupons = self.coupons.write().await;
        let stored = coupons
            .get_mut(&coupon.id)
            .ok_or(CouponError::CouponNotFound(coupon.id))?;
        if stored.version + 1 != coupon.version {
            return Err(CouponError::VersionConflict {
                coupon_id: coupon.id,
                expected: stored.version + 1,
                actual: coupon.version,
            });
        }
        *stored = coupon;
        Ok(())
    }
}

/// In-memory user-coupon store.
#[derive(Clone, Default)]
pub struct InMemoryUserCouponStore {
    grants: Arc<RwLock<HashMap<UserCouponId, UserCoupon>>>,
}

impl InMemoryUserCouponStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of grants, for test assertions.
    pub async fn grant_count(&self) -> usize {
        self.grants.read().await.len()
    }
}

#[async_trait]
impl UserCouponStore for InMemoryUserCouponStore {
    async fn insert(&self, grant: UserCoupon) -> Result<()> {
        let mut grants = self.grants.write().await;
        let duplicate = grants.values().any(|g| {
            g.user_id == grant.user_id
                && g.coupon_id == grant.coupon_id
                && g.state != UserCouponState::Expired
        });
        if duplicate {
            return Err(CouponError::AlreadyIssued);
        }
        grants.insert(grant.id, grant);
        Ok(())
    }

    async fn get(&self, id: UserCouponId) -> Result<Option<UserCoupon>> {
        Ok(self.grants.read().await.get(&id).cloned())
    }

    async fn redeemable_for(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
    ) -> Result<Option<UserCoupon>> {
        let grants = self.grants.read().await;
        Ok(grants
            .values()
            .find(|g| {
                g.user_id == user_id
                    && g.coupon_id == coupon_id
                    && g.state == UserCouponState::Issued
            })
            .cloned())
    }

    async fn has_non_expired(&self, user_id: UserId, coupon_id: CouponId) -> Result<bool> {
        let grants = self.grants.read().await;
        Ok(grants.values().any(|g| {
            g.user_id == user_id
                && g.coupon_id == coupon_id
                && g.state != UserCouponState::Expired
        }))
    }

    async fn update(&self, grant: UserCoupon) -> Result<()> {
        let mut grants = self.grants.write().await;
        if !grants.contains_key(&grant.id) {
            return Err(CouponError::GrantNotFound(grant.id));
        }
        grants.insert(grant.id, grant);
        Ok(())
    }

    async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut grants = self.grants.write().await;
        let mut lapsed = 0;
        for grant in grants.values_mut() {
            if grant.state == UserCouponState::Issued && now >= grant.expires_at {
                grant.state = UserCouponState::Expired;
                lapsed += 1;
            }
        }
        Ok(lapsed)
    }
}

struct StoredTicket {
    ticket: QueueTicket,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
    waiting: HashMap<CouponId, VecDeque<TicketId>>,
    tickets: HashMap<TicketId, StoredTicket>,
    user_index: HashMap<(CouponId, UserId), TicketId>,
    positions: HashMap<CouponId, u64>,
}

/// In-memory admission queue store, mirroring the key-value/list layout a
/// production deployment keeps in its KV store (`waiting:{coupon}` list,
/// ticket blob with TTL, user index, position counter).
#[derive(Clone, Default)]
pub struct InMemoryQueueStore {
    state: Arc<RwLock<QueueState>>,
}

impl InMemoryQueueStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn try_push_waiting(
        &self,
        coupon_id: CouponId,
        ticket_id: TicketId,
        capacity: usize,
    ) -> Result<bool> {
        let mut state = self.state.write().await;
        let list = state.waiting.entry(coupon_id).or_default();
        if list.len() >= capacity {
            return Ok(false);
        }
        list.push_back(ticket_id);
        Ok(true)
    }

    async fn pop_waiting(&self, coupon_id: CouponId, max: usize) -> Result<Vec<TicketId>> {
        let mut state = self.state.write().await;
        let Some(list) = state.waiting.get_mut(&coupon_id) else {
            return Ok(Vec::new());
        };
        let take = max.min(list.len());
        Ok(list.drain(..take).collect())
    }

    async fn depth(&self, coupon_id: CouponId) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state.waiting.get(&coupon_id).map_or(0, VecDeque::len))
    }

    async fn next_position(&self, coupon_id: CouponId) -> Result<u64> {
        let mut state = self.state.write().await;
        let counter = state.positions.entry(coupon_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn put_ticket(&self, ticket: QueueTicket, ttl: Duration) -> Result<()> {
        let mut state = self.state.write().await;
        let expires_at = Utc::now()
            + TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::seconds(i32::MAX as i64));
        state
            .user_index
            .insert((ticket.coupon_id, ticket.user_id), ticket.id);
        state
            .tickets
            .insert(ticket.id, StoredTicket { ticket, expires_at });
        Ok(())
    }

    async fn get_ticket(&self, id: TicketId) -> Result<Option<QueueTicket>> {
        let state = self.state.read().await;
        Ok(state.tickets.get(&id).map(|s| s.ticket.clone()))
    }

    async fn update_ticket(&self, ticket: QueueTicket) -> Result<()> {
        let mut state = self.state.write().await;
        let stored = state
            .tickets
            .get_mut(&ticket.id)
            .ok_or(CouponError::TicketNotFound(ticket.id))?;
        stored.ticket = ticket;
        Ok(())
    }

    async fn ticket_for_user(
        &self,
        coupon_id: CouponId,
        user_id: UserId,
    ) -> Result<Option<QueueTicket>> {
        let state = self.state.read().await;
        let Some(ticket_id) = state.user_index.get(&(coupon_id, user_id)) else {
            return Ok(None);
        };
        Ok(state.tickets.get(ticket_id).map(|s| s.ticket.clone()))
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<QueueTicket>> {
        let mut state = self.state.write().await;
        let mut expired = Vec::new();
        let mut garbage = Vec::new();

        for (id, stored) in state.tickets.iter_mut() {
            if now < stored.expires_at {
                continue;
            }
            match stored.ticket.state {
                TicketState::Waiting => {
                    stored.ticket.expire()?;
                    expired.push(stored.ticket.clone());
                }
                // Processing tickets are left for the worker to finish.
                TicketState::Processing => {}
                _ => garbage.push(*id),
            }
        }

        for ticket in &expired {
            if let Some(list) = state.waiting.get_mut(&ticket.coupon_id) {
                list.retain(|id| id != &ticket.id);
            }
            state.user_index.remove(&(ticket.coupon_id, ticket.user_id));
        }
        for id in garbage {
            if let Some(stored) = state.tickets.remove(&id) {
                state
                    .user_index
                    .retain(|_, ticket_id| ticket_id != &stored.ticket.id);
            }
        }

        Ok(expired)
    }

    async fn waiting_coupons(&self) -> Result<Vec<CouponId>> {
        let state = self.state.read().await;
        Ok(state
            .waiting
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(id, _)| *id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DiscountRule;
    use common::Money;

    fn coupon(total: u32) -> Coupon {
        let now = Utc::now();
        Coupon::new(
            "Test",
            DiscountRule::Percentage(10),
            Money::zero(),
            total,
            now - TimeDelta::hours(1),
            now + TimeDelta::hours(1),
        )
    }

    const TTL: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn versioned_update_rejects_stale_writes() {
        let store = InMemoryCouponStore::new();
        let c = coupon(5);
        let id = c.id;
        store.insert(c.clone()).await.unwrap();

        let updated = c.issue_one().unwrap();
        store.update_versioned(updated.clone()).await.unwrap();

        // Re-applying the same update is a lost-update attempt.
        let result = store.update_versioned(updated).await;
        assert!(matches!(result, Err(CouponError::VersionConflict { .. })));

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.issued_quantity, 1);
    }

    #[tokio::test]
    async fn second_grant_for_same_pair_is_rejected() {
        let store = InMemoryUserCouponStore::new();
        let c = coupon(5);
        let user = UserId::new();

        store.insert(UserCoupon::new(user, &c)).await.unwrap();
        let result = store.insert(UserCoupon::new(user, &c)).await;
        assert!(matches!(result, Err(CouponError::AlreadyIssued)));
        assert_eq!(store.grant_count().await, 1);
    }

    #[tokio::test]
    async fn expired_grant_allows_a_fresh_one() {
        let store = InMemoryUserCouponStore::new();
        let c = coupon(5);
        let user = UserId::new();

        let mut first = UserCoupon::new(user, &c);
        first.state = UserCouponState::Expired;
        store.insert(first).await.unwrap();

        store.insert(UserCoupon::new(user, &c)).await.unwrap();
        assert_eq!(store.grant_count().await, 2);
    }

    #[tokio::test]
    async fn expire_lapsed_grants() {
        let store = InMemoryUserCouponStore::new();
        let c = coupon(5);
        let grant = UserCoupon::new(UserId::new(), &c);
        let id = grant.id;
        store.insert(grant).await.unwrap();

        let lapsed = store
            .expire_lapsed(c.valid_until + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(lapsed, 1);

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.state, UserCouponState::Expired);
    }

    #[tokio::test]
    async fn bounded_push_rejects_at_capacity() {
        let store = InMemoryQueueStore::new();
        let coupon_id = CouponId::new();

        assert!(store
            .try_push_waiting(coupon_id, TicketId::new(), 2)
            .await
            .unwrap());
        assert!(store
            .try_push_waiting(coupon_id, TicketId::new(), 2)
            .await
            .unwrap());
        assert!(!store
            .try_push_waiting(coupon_id, TicketId::new(), 2)
            .await
            .unwrap());
        assert_eq!(store.depth(coupon_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn pop_preserves_fifo_order() {
        let store = InMemoryQueueStore::new();
        let coupon_id = CouponId::new();
        let ids: Vec<TicketId> = (0..3).map(|_| TicketId::new()).collect();

        for id in &ids {
            store.try_push_waiting(coupon_id, *id, 10).await.unwrap();
        }

        let popped = store.pop_waiting(coupon_id, 2).await.unwrap();
        assert_eq!(popped, &ids[..2]);
        let rest = store.pop_waiting(coupon_id, 10).await.unwrap();
        assert_eq!(rest, &ids[2..]);
        assert_eq!(store.depth(coupon_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn positions_are_monotonic_per_coupon() {
        let store = InMemoryQueueStore::new();
        let a = CouponId::new();
        let b = CouponId::new();

        assert_eq!(store.next_position(a).await.unwrap(), 1);
        assert_eq!(store.next_position(a).await.unwrap(), 2);
        assert_eq!(store.next_position(b).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn user_index_finds_the_ticket() {
        let store = InMemoryQueueStore::new();
        let coupon_id = CouponId::new();
        let user_id = UserId::new();
        let ticket = QueueTicket::new(TicketId::new(), user_id, coupon_id, 1);

        store.put_ticket(ticket.clone(), TTL).await.unwrap();

        let found = store
            .ticket_for_user(coupon_id, user_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, ticket.id);
        assert!(store
            .ticket_for_user(coupon_id, UserId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expire_stale_removes_waiting_tickets_from_the_queue() {
        let store = InMemoryQueueStore::new();
        let coupon_id = CouponId::new();
        let user_id = UserId::new();
        let ticket = QueueTicket::new(TicketId::new(), user_id, coupon_id, 1);

        store
            .try_push_waiting(coupon_id, ticket.id, 10)
            .await
            .unwrap();
        store.put_ticket(ticket, Duration::ZERO).await.unwrap();

        let expired = store
            .expire_stale(Utc::now() + TimeDelta::seconds(1))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].state, TicketState::Expired);
        assert_eq!(store.depth(coupon_id).await.unwrap(), 0);

        // The slot and the user index are free again.
        assert!(store
            .ticket_for_user(coupon_id, user_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expire_stale_leaves_fresh_tickets_alone() {
        let store = InMemoryQueueStore::new();
        let coupon_id = CouponId::new();
        let ticket = QueueTicket::new(TicketId::new(), UserId::new(), coupon_id, 1);

        store
            .try_push_waiting(coupon_id, ticket.id, 10)
            .await
            .unwrap();
        store.put_ticket(ticket, TTL).await.unwrap();

        let expired = store.expire_stale(Utc::now()).await.unwrap();
        assert!(expired.is_empty());
        assert_eq!(store.depth(coupon_id).await.unwrap(), 1);
    }
}
