//! Checkout, order, and catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CouponId, Money, OrderId, ProductId, RequestId, UserId};
use orders::Order;
use sequencer::{CheckoutOutcome, CheckoutRequest, OutcomeKind};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::error::ApiError;
use crate::routes::coupons::parse_uuid_path;

// -- Request types --

#[derive(Deserialize)]
pub struct SubmitCheckoutRequest {
    pub user_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub coupon_id: Option<String>,
    #[serde(default)]
    pub gift_wrap: bool,
}

#[derive(Deserialize)]
pub struct RegisterProductRequest {
    pub product_id: String,
    pub name: String,
    pub unit_price_cents: i64,
    pub on_hand: u32,
}

#[derive(Deserialize)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct CheckoutAcceptedResponse {
    pub request_id: String,
}

#[derive(Serialize)]
pub struct OutcomeResponse {
    pub request_id: String,
    pub status: String,
    pub order_id: Option<String>,
    pub reason: Option<String>,
}

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub gift_wrap: bool,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub order_id: String,
    pub user_id: String,
    pub state: String,
    pub lines: Vec<OrderLineResponse>,
    pub gross_cents: i64,
    pub discount_cents: i64,
    pub net_cents: i64,
    pub payment_id: Option<String>,
}

impl From<CheckoutOutcome> for OutcomeResponse {
    fn from(outcome: CheckoutOutcome) -> Self {
        match outcome.kind {
            OutcomeKind::Completed { order_id } => Self {
                request_id: outcome.request_id.to_string(),
                status: "completed".to_string(),
                order_id: Some(order_id.to_string()),
                reason: None,
            },
            OutcomeKind::Rejected { reason } => Self {
                request_id: outcome.request_id.to_string(),
                status: "rejected".to_string(),
                order_id: None,
                reason: Some(reason),
            },
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            order_id: order.id.to_string(),
            user_id: order.user_id.to_string(),
            state: order.state.to_string(),
            lines: order
                .lines
                .iter()
                .map(|line| OrderLineResponse {
                    product_id: line.product_id.to_string(),
                    product_name: line.product_name.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    gift_wrap: line.gift_wrap,
                })
                .collect(),
            gross_cents: order.gross.cents(),
            discount_cents: order.discount.cents(),
            net_cents: order.net.cents(),
            payment_id: order.payment_id,
        }
    }
}

// -- Handlers --

/// POST /products — register a product with price and stock.
#[tracing::instrument(skip(state, req))]
pub async fn register_product(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterProductRequest>,
) -> Result<axum::http::StatusCode, ApiError> {
    let product_id = ProductId::new(req.product_id);
    state
        .pricing
        .register_product(
            product_id.clone(),
            req.name,
            Money::from_cents(req.unit_price_cents),
        )
        .await;
    state
        .ledger
        .set_on_hand(product_id, req.on_hand)
        .await
        .map_err(orders::CheckoutError::from)?;
    Ok(axum::http::StatusCode::CREATED)
}

/// POST /checkout — submit a checkout request; the outcome arrives
/// asynchronously over the user's push channel and by polling.
#[tracing::instrument(skip(state, req))]
pub async fn submit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitCheckoutRequest>,
) -> Result<(axum::http::StatusCode, Json<CheckoutAcceptedResponse>), ApiError> {
    let user_id: UserId = parse_uuid_path(&req.user_id, "user id")?;
    let mut request = CheckoutRequest::new(user_id, ProductId::new(req.product_id), req.quantity);
    if let Some(raw) = &req.coupon_id {
        let coupon_id: CouponId = parse_uuid_path(raw, "coupon id")?;
        request = request.with_coupon(coupon_id);
    }
    if req.gift_wrap {
        request = request.with_gift_wrap();
    }

    let request_id = request.request_id;
    state.sequencer.submit(request).await?;

    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(CheckoutAcceptedResponse {
            request_id: request_id.to_string(),
        }),
    ))
}

/// GET /checkout/:request_id — poll a checkout outcome.
#[tracing::instrument(skip(state))]
pub async fn outcome(
    State(state): State<Arc<AppState>>,
    Path(request_id): Path<String>,
) -> Result<Json<OutcomeResponse>, ApiError> {
    let request_id: RequestId = parse_uuid_path(&request_id, "request id")?;

    let outcome = state
        .sequencer
        .outcome(request_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("No outcome yet for request {request_id}")))?;
    Ok(Json(outcome.into()))
}

/// GET /orders/:id — load an order by ID.
#[tracing::instrument(skip(state))]
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_uuid_path(&id, "order id")?;

    let order = state
        .checkout
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/payment — take payment for a pending order.
#[tracing::instrument(skip(state))]
pub async fn pay(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_uuid_path(&id, "order id")?;
    let order = state.checkout.process_payment(order_id).await?;
    Ok(Json(order.into()))
}

/// POST /orders/:id/cancel — cancel an order.
#[tracing::instrument(skip(state, req))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<CancelRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id: OrderId = parse_uuid_path(&id, "order id")?;
    let reason = req.reason.as_deref().unwrap_or("cancelled by user");
    let order = state.checkout.cancel_order(order_id, reason).await?;
    Ok(Json(order.into()))
}
