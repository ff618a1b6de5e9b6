//! Order state machine.

use serde::{Deserialize, Serialize};

/// The state of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// PendingPayment ──┬──► Paid ──► Completed
///        │         │      │
///        │         │      └──► Cancelled (refund)
///        │         └──► Cancelled
///        └──► Expired (reservation sweep)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum OrderState {
    /// Order created, stock held, awaiting payment.
    #[default]
    PendingPayment,

    /// Payment confirmed, stock committed.
    Paid,

    /// Fulfilled and shipped (terminal).
    Completed,

    /// Cancelled by the user or a failed flow (terminal).
    Cancelled,

    /// Payment never arrived before the stock hold lapsed (terminal).
    Expired,
}

impl OrderState {
    /// Returns true if payment can be taken in this state.
    pub fn can_pay(&self) -> bool {
        matches!(self, OrderState::PendingPayment)
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        matches!(self, OrderState::PendingPayment | OrderState::Paid)
    }

    /// Returns true if the order can be completed in this state.
    pub fn can_complete(&self) -> bool {
        matches!(self, OrderState::Paid)
    }

    /// Returns true if the pre-payment phase can still expire the order.
    pub fn can_expire(&self) -> bool {
        matches!(self, OrderState::PendingPayment)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Completed | OrderState::Cancelled | OrderState::Expired
        )
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderState::PendingPayment => "PendingPayment",
            OrderState::Paid => "Paid",
            OrderState::Completed => "Completed",
            OrderState::Cancelled => "Cancelled",
            OrderState::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for OrderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_pending_payment() {
        assert_eq!(OrderState::default(), OrderState::PendingPayment);
    }

    #[test]
    fn only_pending_orders_take_payment() {
        assert!(OrderState::PendingPayment.can_pay());
        assert!(!OrderState::Paid.can_pay());
        assert!(!OrderState::Completed.can_pay());
        assert!(!OrderState::Cancelled.can_pay());
        assert!(!OrderState::Expired.can_pay());
    }

    #[test]
    fn cancellation_covers_pending_and_paid() {
        assert!(OrderState::PendingPayment.can_cancel());
        assert!(OrderState::Paid.can_cancel());
        assert!(!OrderState::Completed.can_cancel());
        assert!(!OrderState::Cancelled.can_cancel());
        assert!(!OrderState::Expired.can_cancel());
    }

    #[test]
    fn expiry_only_hits_the_prepayment_phase() {
        assert!(OrderState::PendingPayment.can_expire());
        assert!(!OrderState::Paid.can_expire());
        assert!(!OrderState::Cancelled.can_expire());
    }

    #[test]
    fn terminal_states() {
        assert!(!OrderState::PendingPayment.is_terminal());
        assert!(!OrderState::Paid.is_terminal());
        assert!(OrderState::Completed.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
        assert!(OrderState::Expired.is_terminal());
    }

    #[test]
    fn display() {
        assert_eq!(OrderState::PendingPayment.to_string(), "PendingPayment");
        assert_eq!(OrderState::Expired.to_string(), "Expired");
    }
}
