//! Coupon redemption against orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{CouponId, Money, UserCouponId, UserId};
use keyed_lock::LockRegistry;

use crate::{CouponError, CouponStore, Result, UserCouponStore};

/// Applies grants to orders: quoting the discount at pricing time and
/// marking the grant Used when payment completes.
pub struct CouponRedemption {
    coupons: Arc<dyn CouponStore>,
    grants: Arc<dyn UserCouponStore>,
    locks: Arc<LockRegistry>,
    lock_wait: Duration,
}

impl CouponRedemption {
    /// Creates a redemption service over the given stores.
    pub fn new(
        coupons: Arc<dyn CouponStore>,
        grants: Arc<dyn UserCouponStore>,
        locks: Arc<LockRegistry>,
        lock_wait: Duration,
    ) -> Self {
        Self {
            coupons,
            grants,
            locks,
            lock_wait,
        }
    }

    /// Returns the discount the user's grant gives on `order_amount`,
    /// without consuming the grant. Fails if the user holds no redeemable
    /// grant or the order misses the coupon's minimum.
    pub async fn quote(
        &self,
        user_id: UserId,
        coupon_id: CouponId,
        order_amount: Money,
    ) -> Result<Money> {
        let coupon = self
            .coupons
            .get(coupon_id)
            .await?
            .ok_or(CouponError::CouponNotFound(coupon_id))?;

        let grant = self
            .grants
            .redeemable_for(user_id, coupon_id)
            .await?
            .ok_or(CouponError::CouponNotActive)?;
        if !grant.is_redeemable(Utc::now()) {
            return Err(CouponError::CouponNotActive);
        }

        coupon.discount_on(order_amount)
    }

    /// Consumes the user's grant for the coupon. Returns the grant ID.
    ///
    /// Runs under a per-grant lock so concurrent payments cannot redeem
    /// the same grant twice.
    #[tracing::instrument(skip(self))]
    pub async fn redeem(&self, user_id: UserId, coupon_id: CouponId) -> Result<UserCouponId> {
        let _guard = self
            .locks
            .acquire(&format!("grant:{user_id}:{coupon_id}"), self.lock_wait)
            .await?;

        let mut grant = self
            .grants
            .redeemable_for(user_id, coupon_id)
            .await?
            .ok_or(CouponError::CouponNotActive)?;
        grant.redeem(Utc::now())?;
        self.grants.update(grant.clone()).await?;

        metrics::counter!("coupons_redeemed_total").increment(1);
        Ok(grant.id)
    }

    /// Expires Issued grants past their validity. Returns how many lapsed.
    pub async fn expire_lapsed(&self, now: DateTime<Utc>) -> Result<usize> {
        self.grants.expire_lapsed(now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Coupon, DiscountRule, InMemoryCouponStore, InMemoryUserCouponStore, UserCoupon};
    use chrono::TimeDelta;

    struct Fixture {
        redemption: CouponRedemption,
        grants: Arc<InMemoryUserCouponStore>,
        coupon: Coupon,
    }

    async fn setup() -> Fixture {
        let coupons = Arc::new(InMemoryCouponStore::new());
        let grants = Arc::new(InMemoryUserCouponStore::new());

        let now = Utc::now();
        let coupon = Coupon::new(
            "Tenner",
            DiscountRule::FixedAmount(Money::from_cents(1000)),
            Money::from_cents(5000),
            10,
            now - TimeDelta::hours(1),
            now + TimeDelta::hours(1),
        );
        coupons.insert(coupon.clone()).await.unwrap();

        let redemption = CouponRedemption::new(
            coupons,
            grants.clone(),
            Arc::new(LockRegistry::new()),
            Duration::from_secs(3),
        );
        Fixture {
            redemption,
            grants,
            coupon,
        }
    }

    #[tokio::test]
    async fn quote_applies_the_discount_rule() {
        let f = setup().await;
        let user = UserId::new();
        f.grants
            .insert(UserCoupon::new(user, &f.coupon))
            .await
            .unwrap();

        let discount = f
            .redemption
            .quote(user, f.coupon.id, Money::from_cents(6000))
            .await
            .unwrap();
        assert_eq!(discount.cents(), 1000);
    }

    #[tokio::test]
    async fn quote_enforces_the_minimum_order() {
        let f = setup().await;
        let user = UserId::new();
        f.grants
            .insert(UserCoupon::new(user, &f.coupon))
            .await
            .unwrap();

        let result = f
            .redemption
            .quote(user, f.coupon.id, Money::from_cents(4999))
            .await;
        assert!(matches!(result, Err(CouponError::MinimumNotMet { .. })));
    }

    #[tokio::test]
    async fn quote_without_a_grant_fails() {
        let f = setup().await;
        let result = f
            .redemption
            .quote(UserId::new(), f.coupon.id, Money::from_cents(6000))
            .await;
        assert!(matches!(result, Err(CouponError::CouponNotActive)));
    }

    #[tokio::test]
    async fn redeem_consumes_the_grant_once() {
        let f = setup().await;
        let user = UserId::new();
        f.grants
            .insert(UserCoupon::new(user, &f.coupon))
            .await
            .unwrap();

        f.redemption.redeem(user, f.coupon.id).await.unwrap();

        // The grant is no longer redeemable.
        let result = f.redemption.redeem(user, f.coupon.id).await;
        assert!(matches!(result, Err(CouponError::CouponNotActive)));
    }
}
