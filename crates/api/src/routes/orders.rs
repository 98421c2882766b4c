//! Checkout and order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::{InMemoryPaymentGateway, OrderWorkflow, PaymentsService, PlaceOrder};
use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Clock, Order};
use serde::{Deserialize, Serialize};
use store::Stores;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::response::ApiResponse;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub workflow: OrderWorkflow<S, InMemoryPaymentGateway>,
    pub payments: PaymentsService<S, InMemoryPaymentGateway>,
    pub gateway: InMemoryPaymentGateway,
    pub store: S,
    pub clock: Arc<dyn Clock>,
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub shipping_address: serde_json::Value,
    pub billing_address: Option<serde_json::Value>,
    pub shipping_method: String,
    pub customer_notes: Option<String>,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderLineResponse {
    pub album_id: String,
    pub title: String,
    pub artist: String,
    pub format: String,
    pub cover_image: Option<String>,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub status: String,
    pub lines: Vec<OrderLineResponse>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub coupon_code: Option<String>,
    pub shipping_method: String,
    pub shipping_address: serde_json::Value,
    pub billing_address: serde_json::Value,
    pub customer_notes: Option<String>,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub shipped_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        OrderResponse {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            status: order.status().to_string(),
            lines: order
                .lines()
                .iter()
                .map(|line| OrderLineResponse {
                    album_id: line.product_id.to_string(),
                    title: line.title.clone(),
                    artist: line.artist.clone(),
                    format: line.format.clone(),
                    cover_image: line.cover_image.clone(),
                    quantity: line.quantity,
                    unit_price_cents: line.unit_price.cents(),
                    line_total_cents: line.line_total.cents(),
                })
                .collect(),
            subtotal_cents: order.subtotal().cents(),
            discount_cents: order.discount_amount().cents(),
            shipping_cents: order.shipping_amount().cents(),
            tax_cents: order.tax_amount().cents(),
            total_cents: order.total().cents(),
            coupon_code: order.coupon_code().map(String::from),
            shipping_method: order.shipping_method().to_string(),
            shipping_address: order.shipping_address().clone(),
            billing_address: order.billing_address().clone(),
            customer_notes: order.customer_notes().map(String::from),
            currency: order.currency().to_string(),
            created_at: order.created_at(),
            shipped_at: order.shipped_at(),
            delivered_at: order.delivered_at(),
        }
    }
}

// -- Handlers --

/// POST /orders — convert the caller's cart into an order.
#[tracing::instrument(skip(state, identity, req))]
pub async fn create<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ApiError> {
    let order = state
        .workflow
        .place_order(
            &identity.0,
            PlaceOrder {
                shipping_address: req.shipping_address,
                billing_address: req.billing_address,
                shipping_method: req.shipping_method,
                customer_notes: req.customer_notes,
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::with_message(OrderResponse::from(&order), "Order placed"),
    ))
}

/// GET /orders/{id} — load one of the caller's orders.
#[tracing::instrument(skip(state, identity))]
pub async fn get<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let order = load_owned_order(&state, &identity, id).await?;
    Ok(ApiResponse::ok(OrderResponse::from(&order)))
}

/// POST /orders/{id}/cancel — cancel one of the caller's orders.
#[tracing::instrument(skip(state, identity))]
pub async fn cancel<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let order = load_owned_order(&state, &identity, id).await?;
    let cancelled = state.workflow.cancel_order(order.id()).await?;
    Ok(ApiResponse::with_message(
        OrderResponse::from(&cancelled),
        "Order cancelled",
    ))
}

/// Loads an order, hiding other identities' orders behind a 404.
pub(crate) async fn load_owned_order<S: Stores>(
    state: &AppState<S>,
    identity: &Identity,
    id: Uuid,
) -> Result<Order, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .store
        .order(order_id)
        .await?
        .filter(|o| o.placed_by() == &identity.0)
        .ok_or_else(|| ApiError::NotFound(format!("Order {id} not found")))?;
    Ok(order)
}
