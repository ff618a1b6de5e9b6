//! Stock reservation management.
//!
//! Available quantity is `on_hand - reserved`. A reservation holds stock
//! for a bounded time; it is either confirmed into a committed decrement,
//! released back, or expired by the periodic sweep. Every counter
//! mutation happens under the keyed lock of the owning product, so two
//! products never contend with each other.

mod error;
mod ledger;
mod reservation;

pub use error::{InventoryError, Result};
pub use ledger::{StockLedger, SweepOutcome};
pub use reservation::{ReservationState, StockReservation};
