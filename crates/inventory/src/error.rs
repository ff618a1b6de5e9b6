//! Inventory error types.

use common::{ProductId, ReservationId};
use keyed_lock::LockError;
use thiserror::Error;

use crate::reservation::ReservationState;

/// Errors that can occur during stock operations.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Not enough available stock to satisfy the request.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The product has never been registered with the ledger.
    #[error("Unknown product: {0}")]
    UnknownProduct(ProductId),

    /// The reservation does not exist.
    #[error("Reservation not found: {0}")]
    ReservationNotFound(ReservationId),

    /// The reservation is not in a state that allows the action.
    #[error("Cannot {action} reservation in {current} state")]
    InvalidStateTransition {
        current: ReservationState,
        action: &'static str,
    },

    /// A counter would have gone negative. This is a programmer error:
    /// releases must match prior reservations.
    #[error("Stock counter underflow for {product_id}")]
    CounterUnderflow { product_id: ProductId },

    /// Lock acquisition failed.
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),
}

/// Convenience type alias for inventory results.
pub type Result<T> = std::result::Result<T, InventoryError>;
