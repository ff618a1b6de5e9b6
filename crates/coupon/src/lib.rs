//! Flash-sale coupon issuance.
//!
//! Admission and fulfillment are two phases. The admission queue is a
//! bounded FIFO per coupon: once `total_quantity` tickets are waiting,
//! further demand is rejected outright, converting an unbounded stampede
//! into a bounded, fair, replayable backlog. The issuance worker then
//! drains tickets in position order and performs the actual grant, so the
//! lock-bearing grant step only ever sees demand that already passed the
//! capacity check.

mod admission;
mod coupon;
mod error;
mod issuance;
mod redemption;
mod store;
mod ticket;
mod user_coupon;

pub use admission::{AdmissionConfig, AdmissionQueue};
pub use coupon::{Coupon, DiscountRule};
pub use error::{CouponError, Result};
pub use issuance::{CouponIssuedPayload, DrainStats, IssuanceConfig, IssuanceWorker};
pub use redemption::CouponRedemption;
pub use store::{
    CouponStore, InMemoryCouponStore, InMemoryQueueStore, InMemoryUserCouponStore, QueueStore,
    UserCouponStore,
};
pub use ticket::{QueueTicket, TicketState};
pub use user_coupon::{UserCoupon, UserCouponState};
