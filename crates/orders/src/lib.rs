//! Order domain and checkout orchestration.
//!
//! Composes the keyed locks, stock ledger, coupon redemption, outbox, and
//! sequencer into the three use cases: initiate checkout, process
//! payment, cancel order. Reservation expiry flows back in through the
//! sweeper, which expires linked pending orders exactly once.

mod checkout;
mod coordinator;
mod error;
mod events;
mod order;
mod payment;
mod pricing;
mod state;
mod store;
mod sweeper;

pub use checkout::{CheckoutConfig, CheckoutService};
pub use coordinator::CheckoutCoordinator;
pub use error::{CheckoutError, Result};
pub use events::{
    ORDER_CANCELLED, ORDER_CREATED, ORDER_EXPIRED, PAYMENT_COMPLETED, OrderCancelledPayload,
    OrderCreatedPayload, OrderExpiredPayload, PaymentCompletedPayload,
};
pub use order::{Order, OrderLine};
pub use payment::{InMemoryPaymentGateway, PaymentGateway, PaymentResult};
pub use pricing::{CatalogPricing, PricedCart, PricingService};
pub use state::OrderState;
pub use store::{InMemoryOrderStore, OrderStore};
pub use sweeper::ReservationSweeper;
