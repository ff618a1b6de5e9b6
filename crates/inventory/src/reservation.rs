//! Stock reservation records.

use chrono::{DateTime, TimeDelta, Utc};
use common::{OrderId, ProductId, ReservationId, UserId};
use serde::{Deserialize, Serialize};

/// The state of a stock reservation.
///
/// State transitions:
/// ```text
/// Active ──┬──► Confirmed
///          ├──► Cancelled
///          └──► Expired
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReservationState {
    /// Stock is held, awaiting confirmation or release.
    #[default]
    Active,

    /// The hold was converted into a committed decrement (terminal).
    Confirmed,

    /// The hold was released back (terminal).
    Cancelled,

    /// The hold lapsed and was swept (terminal).
    Expired,
}

impl ReservationState {
    /// Returns true if the reservation can still be confirmed.
    pub fn can_confirm(&self) -> bool {
        matches!(self, ReservationState::Active)
    }

    /// Returns true if the reservation can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, ReservationState::Active)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ReservationState::Active)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Active => "Active",
            ReservationState::Confirmed => "Confirmed",
            ReservationState::Cancelled => "Cancelled",
            ReservationState::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for ReservationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A time-bounded hold on product stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockReservation {
    /// Unique reservation identifier.
    pub id: ReservationId,

    /// The product whose stock is held.
    pub product_id: ProductId,

    /// The user the hold was made for.
    pub user_id: UserId,

    /// Held quantity.
    pub quantity: u32,

    /// Current state.
    pub state: ReservationState,

    /// When the hold lapses if neither confirmed nor cancelled.
    pub expires_at: DateTime<Utc>,

    /// The order this hold belongs to, once the order exists.
    pub order_id: Option<OrderId>,

    /// When the hold was created.
    pub created_at: DateTime<Utc>,
}

impl StockReservation {
    /// Creates a new active reservation lasting `ttl_minutes`.
    pub fn new(product_id: ProductId, user_id: UserId, quantity: u32, ttl_minutes: i64) -> Self {
        let now = Utc::now();
        Self {
            id: ReservationId::new(),
            product_id,
            user_id,
            quantity,
            state: ReservationState::Active,
            expires_at: now + TimeDelta::minutes(ttl_minutes),
            order_id: None,
            created_at: now,
        }
    }

    /// Returns true once the hold has lapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == ReservationState::Active && now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_reservation_is_active() {
        let r = StockReservation::new(ProductId::new("SKU-001"), UserId::new(), 2, 30);
        assert_eq!(r.state, ReservationState::Active);
        assert!(r.order_id.is_none());
        assert!(r.expires_at > r.created_at);
    }

    #[test]
    fn active_is_the_only_mutable_state() {
        assert!(ReservationState::Active.can_confirm());
        assert!(ReservationState::Active.can_cancel());
        assert!(!ReservationState::Active.is_terminal());

        for state in [
            ReservationState::Confirmed,
            ReservationState::Cancelled,
            ReservationState::Expired,
        ] {
            assert!(!state.can_confirm());
            assert!(!state.can_cancel());
            assert!(state.is_terminal());
        }
    }

    #[test]
    fn expiry_only_applies_to_active_holds() {
        let mut r = StockReservation::new(ProductId::new("SKU-001"), UserId::new(), 1, 0);
        let later = Utc::now() + TimeDelta::seconds(1);
        assert!(r.is_expired(later));

        r.state = ReservationState::Confirmed;
        assert!(!r.is_expired(later));
    }

    #[test]
    fn display_names() {
        assert_eq!(ReservationState::Active.to_string(), "Active");
        assert_eq!(ReservationState::Expired.to_string(), "Expired");
    }
}
