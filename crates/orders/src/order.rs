//! The order entity.

use chrono::{DateTime, Utc};
use common::{CouponId, Money, OrderId, ProductId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::CheckoutError;
use crate::state::OrderState;

/// A line item owned exclusively by its order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The product.
    pub product_id: ProductId,

    /// Product name at order time.
    pub product_name: String,

    /// Units ordered.
    pub quantity: u32,

    /// Price per unit at order time.
    pub unit_price: Money,

    /// Gift-wrap this line.
    pub gift_wrap: bool,
}

impl OrderLine {
    /// Creates a new line item.
    pub fn new(
        product_id: impl Into<ProductId>,
        product_name: impl Into<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity,
            unit_price,
            gift_wrap: false,
        }
    }

    /// Returns the line total (quantity * unit price).
    pub fn total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// An order with its monetary totals and stock holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// The buyer.
    pub user_id: UserId,

    /// Current state.
    pub state: OrderState,

    /// Line items.
    pub lines: Vec<OrderLine>,

    /// Total before discount.
    pub gross: Money,

    /// Discount applied by the coupon.
    pub discount: Money,

    /// Amount actually charged.
    pub net: Money,

    /// Coupon applied at checkout, redeemed at payment.
    pub coupon_id: Option<CouponId>,

    /// Stock holds backing this order.
    pub reservation_ids: Vec<ReservationId>,

    /// Gateway reference once payment completed.
    pub payment_id: Option<String>,

    /// Reason recorded on cancellation.
    pub cancel_reason: Option<String>,

    /// When the order was created.
    pub created_at: DateTime<Utc>,

    /// When payment completed.
    pub paid_at: Option<DateTime<Utc>>,

    /// Optimistic concurrency version, bumped on every transition.
    pub version: u64,
}

impl Order {
    /// Creates a pending-payment order with priced totals.
    pub fn new(
        user_id: UserId,
        lines: Vec<OrderLine>,
        gross: Money,
        discount: Money,
        net: Money,
    ) -> Self {
        Self {
            id: OrderId::new(),
            user_id,
            state: OrderState::PendingPayment,
            lines,
            gross,
            discount,
            net,
            coupon_id: None,
            reservation_ids: Vec::new(),
            payment_id: None,
            cancel_reason: None,
            created_at: Utc::now(),
            paid_at: None,
            version: 0,
        }
    }

    /// Total units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }

    /// Marks the order paid.
    pub fn mark_paid(&mut self, payment_id: impl Into<String>) -> Result<(), CheckoutError> {
        if !self.state.can_pay() {
            return Err(CheckoutError::InvalidStateTransition {
                current: self.state,
                action: "pay",
            });
        }
        self.state = OrderState::Paid;
        self.payment_id = Some(payment_id.into());
        self.paid_at = Some(Utc::now());
        self.version += 1;
        Ok(())
    }

    /// Completes a paid order.
    pub fn complete(&mut self) -> Result<(), CheckoutError> {
        if !self.state.can_complete() {
            return Err(CheckoutError::InvalidStateTransition {
                current: self.state,
                action: "complete",
            });
        }
        self.state = OrderState::Completed;
        self.version += 1;
        Ok(())
    }

    /// Cancels the order with a reason.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), CheckoutError> {
        if !self.state.can_cancel() {
            return Err(CheckoutError::InvalidStateTransition {
                current: self.state,
                action: "cancel",
            });
        }
        self.state = OrderState::Cancelled;
        self.cancel_reason = Some(reason.into());
        self.version += 1;
        Ok(())
    }

    /// Expires a pending order whose stock hold lapsed.
    pub fn expire(&mut self) -> Result<(), CheckoutError> {
        if !self.state.can_expire() {
            return Err(CheckoutError::InvalidStateTransition {
                current: self.state,
                action: "expire",
            });
        }
        self.state = OrderState::Expired;
        self.version += 1;
        Ok(())
    }
}
