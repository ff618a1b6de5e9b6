//! Coupon campaign and admission queue endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{CouponId, Money, TicketId, UserId};
use coupon::{Coupon, CouponStore, DiscountRule, QueueTicket};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateCouponRequest {
    pub name: String,
    /// `"percentage"` or `"fixed"`.
    pub discount_type: String,
    /// Percent (0..=100) or cents, depending on `discount_type`.
    pub discount_value: i64,
    pub min_order_cents: i64,
    pub total_quantity: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct IssueRequest {
    pub user_id: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CouponResponse {
    pub coupon_id: String,
    pub name: String,
    pub total_quantity: u32,
    pub issued_quantity: u32,
}

#[derive(Serialize)]
pub struct TicketResponse {
    pub ticket_id: String,
    pub coupon_id: String,
    pub user_id: String,
    pub position: u64,
    pub state: String,
    pub failure_reason: Option<String>,
    pub user_coupon_id: Option<String>,
}

#[derive(Serialize)]
pub struct QueueDepthResponse {
    pub coupon_id: String,
    pub depth: usize,
}

impl From<QueueTicket> for TicketResponse {
    fn from(ticket: QueueTicket) -> Self {
        Self {
            ticket_id: ticket.id.to_string(),
            coupon_id: ticket.coupon_id.to_string(),
            user_id: ticket.user_id.to_string(),
            position: ticket.position,
            state: ticket.state.to_string(),
            failure_reason: ticket.failure_reason,
            user_coupon_id: ticket.user_coupon_id.map(|id| id.to_string()),
        }
    }
}

pub(crate) fn parse_uuid_path<T: From<uuid::Uuid>>(raw: &str, what: &str) -> Result<T, ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}

// -- Handlers --

/// POST /coupons — create a campaign.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCouponRequest>,
) -> Result<(axum::http::StatusCode, Json<CouponResponse>), ApiError> {
    let discount = match req.discount_type.as_str() {
        "percentage" => {
            let pct = u32::try_from(req.discount_value)
                .ok()
                .filter(|p| *p <= 100)
                .ok_or_else(|| {
                    ApiError::BadRequest("percentage must be between 0 and 100".to_string())
                })?;
            DiscountRule::Percentage(pct)
        }
        "fixed" => DiscountRule::FixedAmount(Money::from_cents(req.discount_value)),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown discount_type: {other}"
            )));
        }
    };

    let coupon = Coupon::new(
        req.name,
        discount,
        Money::from_cents(req.min_order_cents),
        req.total_quantity,
        req.valid_from,
        req.valid_until,
    );
    let response = CouponResponse {
        coupon_id: coupon.id.to_string(),
        name: coupon.name.clone(),
        total_quantity: coupon.total_quantity,
        issued_quantity: coupon.issued_quantity,
    };
    state.coupons.insert(coupon).await?;

    Ok((axum::http::StatusCode::CREATED, Json(response)))
}

/// POST /coupons/:id/issue — enqueue an issuance ticket.
#[tracing::instrument(skip(state, req))]
pub async fn issue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<IssueRequest>,
) -> Result<(axum::http::StatusCode, Json<TicketResponse>), ApiError> {
    let coupon_id: CouponId = parse_uuid_path(&id, "coupon id")?;
    let user_id: UserId = parse_uuid_path(&req.user_id, "user id")?;

    let ticket = state.admission.enqueue(user_id, coupon_id).await?;
    Ok((axum::http::StatusCode::ACCEPTED, Json(ticket.into())))
}

/// GET /coupons/queue/:ticket_id — ticket status by ID.
#[tracing::instrument(skip(state))]
pub async fn ticket_status(
    State(state): State<Arc<AppState>>,
    Path(ticket_id): Path<String>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket_id: TicketId = parse_uuid_path(&ticket_id, "ticket id")?;

    let ticket = state
        .admission
        .ticket(ticket_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {ticket_id} not found")))?;
    Ok(Json(ticket.into()))
}

/// GET /coupons/:id/queue — current queue depth.
#[tracing::instrument(skip(state))]
pub async fn queue_depth(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<QueueDepthResponse>, ApiError> {
    let coupon_id: CouponId = parse_uuid_path(&id, "coupon id")?;

    let depth = state.admission.queue_depth(coupon_id).await?;
    Ok(Json(QueueDepthResponse {
        coupon_id: coupon_id.to_string(),
        depth,
    }))
}
