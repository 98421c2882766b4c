//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::CartError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every response body carries the `{success: false, message, kind}`
/// envelope; `kind` is the machine-readable discriminator the
/// frontends switch on.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client.
    BadRequest(String),
    /// Resource not found.
    NotFound(String),
    /// Cart operation rejected.
    Cart(CartError),
    /// Workflow error.
    Checkout(CheckoutError),
    /// Store error outside a workflow call.
    Store(StoreError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
            }
        };

        let body = serde_json::json!({
            "success": false,
            "kind": kind,
            "message": message,
        });
        (status, axum::Json(body)).into_response()
    }
}

fn cart_error_to_response(err: CartError) -> (StatusCode, &'static str, String) {
    match &err {
        CartError::InvalidQuantity { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_quantity", err.to_string())
        }
        CartError::LineNotFound { .. } => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        CartError::Coupon(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_coupon", err.to_string())
        }
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, &'static str, String) {
    let message = err.to_string();
    match err {
        CheckoutError::CartEmpty => (StatusCode::UNPROCESSABLE_ENTITY, "cart_empty", message),
        CheckoutError::InsufficientStock { .. } => {
            (StatusCode::CONFLICT, "insufficient_stock", message)
        }
        CheckoutError::CouponRejected(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "invalid_coupon", message)
        }
        CheckoutError::UnknownShippingMethod(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "unknown_shipping_method", message)
        }
        CheckoutError::ProductNotFound(_)
        | CheckoutError::OrderNotFound(_)
        | CheckoutError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, "not_found", message),
        // Payment-processor problems are distinct from validation
        // errors so clients can tell "fix your input" from "retry
        // payment".
        CheckoutError::PaymentNotAllowed(_) | CheckoutError::Gateway(_) => {
            (StatusCode::PAYMENT_REQUIRED, "payment_failed", message)
        }
        CheckoutError::Order(_) | CheckoutError::Payment(_) => {
            (StatusCode::CONFLICT, "invalid_state_transition", message)
        }
        CheckoutError::Store(err) => store_error_to_response(err),
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, &'static str, String) {
    match &err {
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", err.to_string()),
        StoreError::Duplicate { .. } => (StatusCode::CONFLICT, "conflict", err.to_string()),
        _ => {
            tracing::error!(error = %err, "store error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
