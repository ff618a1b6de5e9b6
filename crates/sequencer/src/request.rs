//! Checkout requests and their outcomes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CouponId, OrderId, ProductId, RequestId, UserId};
use serde::{Deserialize, Serialize};

/// A "buy now" request submitted to the sequencer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    /// Caller-visible request identifier; the idempotency handle for
    /// at-least-once delivery.
    pub request_id: RequestId,

    /// The buyer.
    pub user_id: UserId,

    /// The contended product; also the partition key.
    pub product_id: ProductId,

    /// Units requested.
    pub quantity: u32,

    /// Coupon to apply, if the user holds a grant.
    pub coupon_id: Option<CouponId>,

    /// Gift-wrap the line item.
    pub gift_wrap: bool,

    /// When the request was submitted.
    pub submitted_at: DateTime<Utc>,
}

impl CheckoutRequest {
    /// Creates a request with a fresh request ID.
    pub fn new(user_id: UserId, product_id: ProductId, quantity: u32) -> Self {
        Self {
            request_id: RequestId::new(),
            user_id,
            product_id,
            quantity,
            coupon_id: None,
            gift_wrap: false,
            submitted_at: Utc::now(),
        }
    }

    /// Applies a coupon to the request.
    pub fn with_coupon(mut self, coupon_id: CouponId) -> Self {
        self.coupon_id = Some(coupon_id);
        self
    }

    /// Requests gift wrapping.
    pub fn with_gift_wrap(mut self) -> Self {
        self.gift_wrap = true;
        self
    }
}

/// Terminal result of a checkout request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutcomeKind {
    /// An order was created and is awaiting payment.
    Completed { order_id: OrderId },

    /// The request was rejected; the reason is caller-facing.
    Rejected { reason: String },
}

/// The outcome delivered back to the submitting user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutOutcome {
    /// The request this outcome answers.
    pub request_id: RequestId,

    /// The user to push the outcome to.
    pub user_id: UserId,

    /// What happened.
    pub kind: OutcomeKind,

    /// When the lane finished processing the request.
    pub processed_at: DateTime<Utc>,
}

impl CheckoutOutcome {
    /// A successful outcome carrying the new order's ID.
    pub fn completed(request: &CheckoutRequest, order_id: OrderId) -> Self {
        Self {
            request_id: request.request_id,
            user_id: request.user_id,
            kind: OutcomeKind::Completed { order_id },
            processed_at: Utc::now(),
        }
    }

    /// A rejection with a caller-facing reason.
    pub fn rejected(request: &CheckoutRequest, reason: impl Into<String>) -> Self {
        Self {
            request_id: request.request_id,
            user_id: request.user_id,
            kind: OutcomeKind::Rejected {
                reason: reason.into(),
            },
            processed_at: Utc::now(),
        }
    }
}

/// Consumer of sequenced checkout requests.
///
/// The handler is called exactly once per unprocessed request id per lane;
/// its outcome (success or rejection) is terminal and recorded before the
/// lane moves on, which is the delivery acknowledgment.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Processes one request to a terminal outcome. Infallible at this
    /// seam: domain failures become [`OutcomeKind::Rejected`].
    async fn handle(&self, request: CheckoutRequest) -> CheckoutOutcome;
}
