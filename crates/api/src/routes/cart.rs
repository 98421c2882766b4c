//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{Cart, CartOwner, Coupon};
use serde::{Deserialize, Serialize};
use store::Stores;
use uuid::Uuid;

use crate::error::ApiError;
use crate::identity::Identity;
use crate::response::ApiResponse;
use crate::routes::orders::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub album_id: Uuid,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CartLineResponse {
    pub album_id: String,
    pub title: String,
    pub quantity: u32,
    pub unit_price_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct CartResponse {
    pub items: Vec<CartLineResponse>,
    pub coupon_code: Option<String>,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
}

/// Builds the cart payload, resolving the applied coupon so the
/// discount reflects its current validity.
async fn cart_response<S: Stores>(
    state: &AppState<S>,
    cart: &Cart,
) -> Result<CartResponse, ApiError> {
    let coupon: Option<Coupon> = match cart.coupon_code() {
        Some(code) => state.store.coupon_by_code(code).await?,
        None => None,
    };
    let totals = cart.totals(coupon.as_ref(), state.clock.now());

    Ok(CartResponse {
        items: cart
            .lines()
            .iter()
            .map(|line| CartLineResponse {
                album_id: line.product_id.to_string(),
                title: line.title.clone(),
                quantity: line.quantity,
                unit_price_cents: line.unit_price.cents(),
                line_total_cents: line.line_total().cents(),
            })
            .collect(),
        coupon_code: cart.coupon_code().map(String::from),
        subtotal_cents: totals.subtotal.cents(),
        discount_cents: totals.discount.cents(),
        total_cents: totals.total.cents(),
    })
}

/// Loads the caller's cart, replacing an expired guest cart with a
/// fresh one.
async fn load_or_create_cart<S: Stores>(
    state: &AppState<S>,
    owner: &CartOwner,
) -> Result<Cart, ApiError> {
    let now = state.clock.now();
    if let Some(cart) = state.store.cart_for_owner(owner).await? {
        if !cart.is_expired(now) {
            return Ok(cart);
        }
        state.store.delete_cart(cart.id()).await?;
    }

    Ok(match owner {
        CartOwner::Customer(id) => Cart::for_customer(*id, now),
        CartOwner::Guest(session) => Cart::for_guest(session.clone(), now),
    })
}

async fn load_cart<S: Stores>(state: &AppState<S>, owner: &CartOwner) -> Result<Cart, ApiError> {
    state
        .store
        .cart_for_owner(owner)
        .await?
        .filter(|c| !c.is_expired(state.clock.now()))
        .ok_or_else(|| ApiError::NotFound("Cart is empty".to_string()))
}

// -- Handlers --

/// GET /cart — the caller's cart, empty if none exists.
#[tracing::instrument(skip(state, identity))]
pub async fn get<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    match state.store.cart_for_owner(&identity.0).await? {
        Some(cart) if !cart.is_expired(state.clock.now()) => {
            Ok(ApiResponse::ok(cart_response(&state, &cart).await?))
        }
        _ => Ok(ApiResponse::ok(CartResponse {
            items: Vec::new(),
            coupon_code: None,
            subtotal_cents: 0,
            discount_cents: 0,
            total_cents: 0,
        })),
    }
}

/// POST /cart/items — add an album to the cart.
#[tracing::instrument(skip(state, identity, req))]
pub async fn add_item<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CartResponse>>), ApiError> {
    let product_id = ProductId::from_uuid(req.album_id);
    let product = state
        .store
        .product(product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Album {product_id} not found")))?;

    let mut cart = load_or_create_cart(&state, &identity.0).await?;
    cart.add_item(&product, req.quantity, state.clock.now())?;
    state.store.save_cart(&cart).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok(cart_response(&state, &cart).await?),
    ))
}

/// PUT /cart/items/{album_id} — set a line's quantity (0 removes).
#[tracing::instrument(skip(state, identity, req))]
pub async fn update_item<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(album_id): Path<Uuid>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let mut cart = load_cart(&state, &identity.0).await?;
    cart.update_item(ProductId::from_uuid(album_id), req.quantity, state.clock.now())?;
    state.store.save_cart(&cart).await?;

    Ok(ApiResponse::ok(cart_response(&state, &cart).await?))
}

/// DELETE /cart/items/{album_id} — remove a line.
#[tracing::instrument(skip(state, identity))]
pub async fn remove_item<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Path(album_id): Path<Uuid>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let mut cart = load_cart(&state, &identity.0).await?;
    cart.remove_item(ProductId::from_uuid(album_id), state.clock.now())?;
    state.store.save_cart(&cart).await?;

    Ok(ApiResponse::ok(cart_response(&state, &cart).await?))
}

/// DELETE /cart — empty the cart.
#[tracing::instrument(skip(state, identity))]
pub async fn clear<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let mut cart = load_cart(&state, &identity.0).await?;
    cart.clear(state.clock.now());
    state.store.save_cart(&cart).await?;

    Ok(ApiResponse::with_message(
        cart_response(&state, &cart).await?,
        "Cart cleared",
    ))
}

/// POST /cart/coupon — apply a coupon code to the cart.
#[tracing::instrument(skip(state, identity, req))]
pub async fn apply_coupon<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
    Json(req): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let mut cart = load_cart(&state, &identity.0).await?;

    let coupon = state
        .store
        .coupon_by_code(&req.code)
        .await?
        .ok_or_else(|| {
            ApiError::Cart(domain::CouponError::UnknownCode { code: req.code.clone() }.into())
        })?;

    cart.apply_coupon(&coupon, state.clock.now())?;
    state.store.save_cart(&cart).await?;

    Ok(ApiResponse::ok(cart_response(&state, &cart).await?))
}

/// DELETE /cart/coupon — detach the applied coupon.
#[tracing::instrument(skip(state, identity))]
pub async fn remove_coupon<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    identity: Identity,
) -> Result<Json<ApiResponse<CartResponse>>, ApiError> {
    let mut cart = load_cart(&state, &identity.0).await?;
    cart.remove_coupon(state.clock.now());
    state.store.save_cart(&cart).await?;

    Ok(ApiResponse::ok(cart_response(&state, &cart).await?))
}
