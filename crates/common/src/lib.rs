//! Shared identifier newtypes and the money value object.

mod ids;
mod money;

pub use ids::{
    CouponId, OrderId, ProductId, RequestId, ReservationId, TicketId, UserCouponId, UserId,
};
pub use money::Money;
