//! The coupon campaign entity.

use chrono::{DateTime, Utc};
use common::{CouponId, Money};
use serde::{Deserialize, Serialize};

use crate::error::CouponError;

/// How a coupon reduces an order total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum DiscountRule {
    /// Percentage off the order total (0..=100).
    Percentage(u32),

    /// Fixed amount off the order total.
    FixedAmount(Money),
}

impl DiscountRule {
    /// Returns the discount this rule grants on `amount`, never more than
    /// the amount itself.
    pub fn discount_for(&self, amount: Money) -> Money {
        match self {
            DiscountRule::Percentage(pct) => amount.percentage(*pct),
            DiscountRule::FixedAmount(fixed) => (*fixed).min(amount),
        }
    }
}

/// A limited-quantity coupon campaign.
///
/// `issued_quantity` is monotonic and never exceeds `total_quantity`. The
/// bound is enforced primarily by the admission queue's capacity check;
/// [`Coupon::issue_one`] is the second gate at grant time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    /// Unique coupon identifier.
    pub id: CouponId,

    /// Campaign name.
    pub name: String,

    /// Discount granted on redemption.
    pub discount: DiscountRule,

    /// Minimum order total the coupon applies to.
    pub min_order_amount: Money,

    /// Number of grants the campaign is limited to.
    pub total_quantity: u32,

    /// Grants made so far.
    pub issued_quantity: u32,

    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window.
    pub valid_until: DateTime<Utc>,

    /// Optimistic concurrency version, bumped on every update.
    pub version: u64,
}

impl Coupon {
    /// Creates a new campaign with nothing issued yet.
    pub fn new(
        name: impl Into<String>,
        discount: DiscountRule,
        min_order_amount: Money,
        total_quantity: u32,
        valid_from: DateTime<Utc>,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            id: CouponId::new(),
            name: name.into(),
            discount,
            min_order_amount,
            total_quantity,
            issued_quantity: 0,
            valid_from,
            valid_until,
            version: 0,
        }
    }

    /// Returns true while the validity window is open.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_from && now < self.valid_until
    }

    /// Grants remaining before the campaign sells out.
    pub fn remaining(&self) -> u32 {
        self.total_quantity.saturating_sub(self.issued_quantity)
    }

    /// Returns true once every grant has been made.
    pub fn is_sold_out(&self) -> bool {
        self.issued_quantity >= self.total_quantity
    }

    /// Returns a copy with one more grant issued and the version bumped,
    /// or [`CouponError::SoldOut`] if the campaign is exhausted.
    pub fn issue_one(&self) -> Result<Coupon, CouponError> {
        if self.is_sold_out() {
            return Err(CouponError::SoldOut {
                issued: self.issued_quantity,
                total: self.total_quantity,
            });
        }
        let mut updated = self.clone();
        updated.issued_quantity += 1;
        updated.version += 1;
        Ok(updated)
    }

    /// Checks the coupon against an order total, returning the discount it
    /// grants or [`CouponError::MinimumNotMet`].
    pub fn discount_on(&self, order_amount: Money) -> Result<Money, CouponError> {
        if order_amount < self.min_order_amount {
            return Err(CouponError::MinimumNotMet {
                order_cents: order_amount.cents(),
                minimum_cents: self.min_order_amount.cents(),
            });
        }
        Ok(self.discount.discount_for(order_amount))
    }
}
