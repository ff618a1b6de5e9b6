//! Outbox event types and payloads emitted by the order use cases.

use common::{CouponId, OrderId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

/// Emitted when a checkout produces a pending-payment order.
pub const ORDER_CREATED: &str = "order.created";
/// Emitted when payment completes and stock is committed.
pub const PAYMENT_COMPLETED: &str = "payment.completed";
/// Emitted when an order is cancelled (with release/refund).
pub const ORDER_CANCELLED: &str = "order.cancelled";
/// Emitted when a pending order expires with its stock hold.
pub const ORDER_EXPIRED: &str = "order.expired";

/// Payload for [`ORDER_CREATED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCreatedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub gross_cents: i64,
    pub discount_cents: i64,
    pub net_cents: i64,
    pub coupon_id: Option<CouponId>,
    pub reservation_ids: Vec<ReservationId>,
}

/// Payload for [`PAYMENT_COMPLETED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCompletedPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub payment_id: String,
    pub amount_cents: i64,
}

/// Payload for [`ORDER_CANCELLED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCancelledPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub reason: String,
    pub refunded: bool,
}

/// Payload for [`ORDER_EXPIRED`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderExpiredPayload {
    pub order_id: OrderId,
    pub user_id: UserId,
}
