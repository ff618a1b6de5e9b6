//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coupon::CouponError;
use orders::CheckoutError;
use sequencer::SequencerError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Admission or issuance error.
    Coupon(CouponError),
    /// Checkout orchestration error.
    Checkout(CheckoutError),
    /// Sequencer submission error.
    Sequencer(SequencerError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Coupon(err) => (coupon_status(&err), err.to_string()),
            ApiError::Checkout(err) => (checkout_status(&err), err.to_string()),
            ApiError::Sequencer(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn coupon_status(err: &CouponError) -> StatusCode {
    match err {
        // Admission-control rejections surface synchronously as conflicts.
        CouponError::QueueFull { .. }
        | CouponError::AlreadyInQueue
        | CouponError::AlreadyIssued
        | CouponError::SoldOut { .. } => StatusCode::CONFLICT,
        CouponError::CouponNotFound(_) | CouponError::TicketNotFound(_) => StatusCode::NOT_FOUND,
        CouponError::CouponNotActive | CouponError::MinimumNotMet { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        CouponError::Lock(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn checkout_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::OrderNotFound(_) | CheckoutError::UnknownProduct(_) => {
            StatusCode::NOT_FOUND
        }
        CheckoutError::Inventory(inventory::InventoryError::InsufficientStock { .. }) => {
            StatusCode::CONFLICT
        }
        CheckoutError::InvalidStateTransition { .. } | CheckoutError::VersionConflict { .. } => {
            StatusCode::CONFLICT
        }
        CheckoutError::Payment(_) => StatusCode::PAYMENT_REQUIRED,
        CheckoutError::Coupon(coupon_err) => coupon_status(coupon_err),
        CheckoutError::Lock(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CouponError> for ApiError {
    fn from(err: CouponError) -> Self {
        ApiError::Coupon(err)
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<SequencerError> for ApiError {
    fn from(err: SequencerError) -> Self {
        ApiError::Sequencer(err)
    }
}
