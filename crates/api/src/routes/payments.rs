//! Payment intent and webhook endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use checkout::PaymentOutcome;
use serde::{Deserialize, Serialize};
use store::Stores;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::response::ApiResponse;
use crate::routes::orders::{AppState, load_owned_order};

// -- Request types --

#[derive(Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: Uuid,
}

/// Processor callback payload. In production this arrives on the
/// processor's signed webhook; the signature check lives upstream.
#[derive(Deserialize)]
pub struct WebhookRequest {
    pub payment_intent_id: String,
    pub status: String,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub failure_reason: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct IntentResponse {
    pub payment_intent_id: String,
    pub client_secret: String,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub payment_id: String,
    pub order_id: String,
    pub status: String,
    pub amount_cents: i64,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
}

// -- Handlers --

/// POST /payments/create-intent — create a processor intent for one
/// of the caller's pending orders.
#[tracing::instrument(skip(state, identity, req))]
pub async fn create_intent<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CreateIntentRequest>,
) -> Result<Json<ApiResponse<IntentResponse>>, ApiError> {
    let order = load_owned_order(&state, &identity, req.order_id).await?;
    let intent = state.payments.create_intent(order.id()).await?;

    Ok(ApiResponse::ok(IntentResponse {
        payment_intent_id: intent.payment_intent_id,
        client_secret: intent.client_secret,
    }))
}

/// POST /payments/webhook — processor confirmation callback.
///
/// Handling is idempotent; replayed callbacks return the settled
/// payment unchanged.
#[tracing::instrument(skip(state, req), fields(intent = %req.payment_intent_id))]
pub async fn webhook<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Json(req): Json<WebhookRequest>,
) -> Result<Json<ApiResponse<PaymentResponse>>, ApiError> {
    let outcome = match req.status.as_str() {
        "succeeded" => PaymentOutcome::Succeeded {
            card_brand: req.card_brand,
            card_last4: req.card_last4,
        },
        "failed" => PaymentOutcome::Failed {
            reason: req.failure_reason,
        },
        other => {
            return Err(ApiError::BadRequest(format!(
                "unknown payment status: {other}"
            )));
        }
    };

    let payment = state
        .payments
        .confirm(&req.payment_intent_id, outcome)
        .await?;

    Ok(ApiResponse::ok(PaymentResponse {
        payment_id: payment.id().to_string(),
        order_id: payment.order_id().to_string(),
        status: payment.status().to_string(),
        amount_cents: payment.amount().cents(),
        card_brand: payment.card_brand().map(String::from),
        card_last4: payment.card_last4().map(String::from),
    }))
}
