//! Checkout error types.

use common::{OrderId, ProductId};
use coupon::CouponError;
use inventory::InventoryError;
use keyed_lock::LockError;
use outbox::OutboxError;
use thiserror::Error;

use crate::state::OrderState;

/// Errors that can occur during checkout orchestration.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Stock operation failed.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// Coupon operation failed.
    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    /// Lock acquisition failed.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    /// Outbox append failed.
    #[error("Outbox error: {0}")]
    Outbox(#[from] OutboxError),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The product is not in the catalog.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// The order is not in a state that allows the action.
    #[error("Cannot {action} order in {current} state")]
    InvalidStateTransition {
        current: OrderState,
        action: &'static str,
    },

    /// The payment gateway declined or failed.
    #[error("Payment failed: {0}")]
    Payment(String),

    /// Optimistic version check failed while updating the order.
    #[error("Version conflict updating order {order_id}: expected {expected}, found {actual}")]
    VersionConflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
