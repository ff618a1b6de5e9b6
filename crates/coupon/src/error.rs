//! Coupon error types.

use common::{CouponId, TicketId};
use keyed_lock::LockError;
use thiserror::Error;

use crate::ticket::TicketState;
use crate::user_coupon::UserCouponState;

/// Errors that can occur during coupon admission and issuance.
#[derive(Debug, Error)]
pub enum CouponError {
    /// The coupon does not exist.
    #[error("Coupon not found: {0}")]
    CouponNotFound(CouponId),

    /// The admission queue has reached the coupon's total quantity.
    #[error("Admission queue full: capacity {capacity}")]
    QueueFull { capacity: u32 },

    /// The user already holds an active ticket for this coupon.
    #[error("User already holds an active queue ticket for this coupon")]
    AlreadyInQueue,

    /// The user already holds a non-expired grant for this coupon.
    #[error("User already holds a grant for this coupon")]
    AlreadyIssued,

    /// Every unit of the coupon has been issued.
    #[error("Coupon sold out: {issued}/{total} issued")]
    SoldOut { issued: u32, total: u32 },

    /// The coupon is outside its validity window.
    #[error("Coupon is not active")]
    CouponNotActive,

    /// The order total is below the coupon's minimum.
    #[error("Order amount {order_cents} below coupon minimum {minimum_cents}")]
    MinimumNotMet {
        order_cents: i64,
        minimum_cents: i64,
    },

    /// The queue ticket does not exist (or its TTL lapsed).
    #[error("Queue ticket not found: {0}")]
    TicketNotFound(TicketId),

    /// The grant record does not exist.
    #[error("Grant not found: {0}")]
    GrantNotFound(common::UserCouponId),

    /// The ticket is not in a state that allows the action.
    #[error("Cannot {action} ticket in {current} state")]
    InvalidTicketTransition {
        current: TicketState,
        action: &'static str,
    },

    /// The grant is not in a state that allows the action.
    #[error("Cannot {action} grant in {current} state")]
    InvalidGrantTransition {
        current: UserCouponState,
        action: &'static str,
    },

    /// Optimistic version check failed while updating the coupon.
    #[error("Version conflict updating coupon {coupon_id}: expected {expected}, found {actual}")]
    VersionConflict {
        coupon_id: CouponId,
        expected: u64,
        actual: u64,
    },

    /// Lock acquisition failed.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Outbox append failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] outbox::OutboxError),
}

/// Convenience type alias for coupon results.
pub type Result<T> = std::result::Result<T, CouponError>;
