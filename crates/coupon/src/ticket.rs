//! Admission queue tickets.

use chrono::{DateTime, Utc};
use common::{CouponId, TicketId, UserCouponId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::CouponError;

/// The state of a queue ticket.
///
/// State transitions:
/// ```text
/// Waiting ──► Processing ──┬──► Completed
///    │                     └──► Failed
///    └──► Expired (TTL)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TicketState {
    /// Admitted, waiting for the issuance worker.
    #[default]
    Waiting,

    /// Picked up by the worker.
    Processing,

    /// Grant succeeded (terminal).
    Completed,

    /// Grant failed (terminal); the reason is recorded on the ticket.
    Failed,

    /// The ticket lapsed before the worker reached it (terminal).
    Expired,
}

impl TicketState {
    /// Returns true while the ticket still occupies a queue slot.
    pub fn is_active(&self) -> bool {
        matches!(self, TicketState::Waiting | TicketState::Processing)
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketState::Waiting => "Waiting",
            TicketState::Processing => "Processing",
            TicketState::Completed => "Completed",
            TicketState::Failed => "Failed",
            TicketState::Expired => "Expired",
        }
    }
}

impl std::fmt::Display for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ticket in a coupon's admission queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueTicket {
    /// Unique ticket identifier.
    pub id: TicketId,

    /// The user who requested the coupon.
    pub user_id: UserId,

    /// The coupon being requested.
    pub coupon_id: CouponId,

    /// FIFO position; assigned from a per-coupon monotonic counter.
    pub position: u64,

    /// Current state.
    pub state: TicketState,

    /// When the ticket was admitted.
    pub enqueued_at: DateTime<Utc>,

    /// When the ticket last changed state.
    pub updated_at: DateTime<Utc>,

    /// Why the grant failed, for Failed tickets.
    pub failure_reason: Option<String>,

    /// The resulting grant, for Completed tickets.
    pub user_coupon_id: Option<UserCouponId>,
}

impl QueueTicket {
    /// Creates a waiting ticket at the given position.
    pub fn new(id: TicketId, user_id: UserId, coupon_id: CouponId, position: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            coupon_id,
            position,
            state: TicketState::Waiting,
            enqueued_at: now,
            updated_at: now,
            failure_reason: None,
            user_coupon_id: None,
        }
    }

    /// Marks the ticket as picked up by the worker.
    pub fn start_processing(&mut self) -> Result<(), CouponError> {
        if self.state != TicketState::Waiting {
            return Err(CouponError::InvalidTicketTransition {
                current: self.state,
                action: "process",
            });
        }
        self.state = TicketState::Processing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a successful grant.
    pub fn complete(&mut self, user_coupon_id: UserCouponId) -> Result<(), CouponError> {
        if self.state != TicketState::Processing {
            return Err(CouponError::InvalidTicketTransition {
                current: self.state,
                action: "complete",
            });
        }
        self.state = TicketState::Completed;
        self.user_coupon_id = Some(user_coupon_id);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Records a failed grant with its reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), CouponError> {
        if self.state != TicketState::Processing {
            return Err(CouponError::InvalidTicketTransition {
                current: self.state,
                action: "fail",
            });
        }
        self.state = TicketState::Failed;
        self.failure_reason = Some(reason.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Expires a waiting ticket whose TTL lapsed.
    pub fn expire(&mut self) -> Result<(), CouponError> {
        if self.state != TicketState::Waiting {
            return Err(CouponError::InvalidTicketTransition {
                current: self.state,
                action: "expire",
            });
        }
        self.state = TicketState::Expired;
        self.updated_at = Utc::now();
        Ok(())
    }
}
