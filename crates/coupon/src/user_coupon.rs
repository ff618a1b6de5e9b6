//! User-coupon grant records.

use chrono::{DateTime, Utc};
use common::{CouponId, UserCouponId, UserId};
use serde::{Deserialize, Serialize};

use crate::coupon::Coupon;
use crate::error::CouponError;

/// The state of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum UserCouponState {
    /// Granted, not yet redeemed.
    #[default]
    Issued,

    /// Redeemed against an order (terminal).
    Used,

    /// Lapsed unredeemed (terminal).
    Expired,
}

impl UserCouponState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserCouponState::Issued => "Issued",
            UserCouponState::Used => "Used",
            UserCouponState::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for UserCouponState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A grant linking a user to a coupon.
///
/// At most one non-expired grant exists per (user, coupon) pair; the
/// stores enforce this on insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserCoupon {
    /// Unique grant identifier.
    pub id: UserCouponId,

    /// The user holding the grant.
    pub user_id: UserId,

    /// The granted coupon.
    pub coupon_id: CouponId,

    /// Current state.
    pub state: UserCouponState,

    /// When the grant was made.
    pub issued_at: DateTime<Utc>,

    /// When the grant lapses unredeemed (the coupon's validity end).
    pub expires_at: DateTime<Utc>,

    /// When the grant was redeemed.
    pub used_at: Option<DateTime<Utc>>,
}

impl UserCoupon {
    /// Creates a fresh grant for a user, expiring with the coupon.
    pub fn new(user_id: UserId, coupon: &Coupon) -> Self {
        Self {
            id: UserCouponId::new(),
            user_id,
            coupon_id: coupon.id,
            state: UserCouponState::Issued,
            issued_at: Utc::now(),
            expires_at: coupon.valid_until,
            used_at: None,
        }
    }

    /// Returns true while the grant can still be redeemed.
    pub fn is_redeemable(&self, now: DateTime<Utc>) -> bool {
        self.state == UserCouponState::Issued && now < self.expires_at
    }

    /// Redeems the grant.
    pub fn redeem(&mut self, now: DateTime<Utc>) -> Result<(), CouponError> {
        if !self.is_redeemable(now) {
            return Err(CouponError::InvalidGrantTransition {
                current: self.state,
                action: "redeem",
            });
        }
        self.state = UserCouponState::Used;
        self.used_at = Some(now);
        Ok(())
    }

    /// Expires an unredeemed grant past its validity.
    pub fn expire(&mut self) -> Result<(), CouponError> {
        if self.state != UserCouponState::Issued {
            return Err(CouponError::InvalidGrantTransition {
                current: self.state,
                action: "expire",
            });
        }
        self.state = UserCouponState::Expired;
        Ok(())
    }
}
