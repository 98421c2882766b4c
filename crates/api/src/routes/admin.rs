//! Admin back-office endpoints.
//!
//! Admin authentication/authorization is terminated upstream; these
//! handlers trust the gateway in front of them.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, ProductId};
use domain::{InventoryLevel, OrderStatus};
use serde::{Deserialize, Serialize};
use store::Stores;
use uuid::Uuid;

use crate::error::ApiError;
use crate::response::ApiResponse;
use crate::routes::orders::{AppState, OrderResponse};

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct StockRequest {
    pub quantity: u32,
}

// -- Response types --

#[derive(Serialize)]
pub struct InventoryResponse {
    pub album_id: String,
    pub quantity: u32,
    pub reserved: u32,
    pub available: u32,
    pub in_stock: bool,
    pub low_stock: bool,
}

impl From<&InventoryLevel> for InventoryResponse {
    fn from(level: &InventoryLevel) -> Self {
        InventoryResponse {
            album_id: level.product_id().to_string(),
            quantity: level.quantity(),
            reserved: level.reserved(),
            available: level.available(),
            in_stock: level.is_in_stock(),
            low_stock: level.is_low_stock(),
        }
    }
}

// -- Handlers --

/// PUT /admin/orders/{id}/status — drive an order transition.
#[tracing::instrument(skip(state, req))]
pub async fn update_order_status<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ApiError> {
    let target: OrderStatus = req
        .status
        .parse()
        .map_err(|e: String| ApiError::BadRequest(e))?;

    let order = state
        .workflow
        .set_status(OrderId::from_uuid(id), target)
        .await?;

    Ok(ApiResponse::with_message(
        OrderResponse::from(&order),
        format!("Order marked {target}"),
    ))
}

/// PUT /admin/inventory/{album_id}/stock — overwrite on-hand stock.
#[tracing::instrument(skip(state, req))]
pub async fn set_stock<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(album_id): Path<Uuid>,
    Json(req): Json<StockRequest>,
) -> Result<Json<ApiResponse<InventoryResponse>>, ApiError> {
    let level = state
        .store
        .set_stock(ProductId::from_uuid(album_id), req.quantity)
        .await?;

    Ok(ApiResponse::ok(InventoryResponse::from(&level)))
}

/// POST /admin/inventory/{album_id}/add-stock — receive stock.
#[tracing::instrument(skip(state, req))]
pub async fn add_stock<S: Stores + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(album_id): Path<Uuid>,
    Json(req): Json<StockRequest>,
) -> Result<Json<ApiResponse<InventoryResponse>>, ApiError> {
    let level = state
        .store
        .add_stock(ProductId::from_uuid(album_id), req.quantity)
        .await?;

    Ok(ApiResponse::ok(InventoryResponse::from(&level)))
}
