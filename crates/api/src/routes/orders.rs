//! Order placement, lookup and cancellation endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{OrderId, ProductId, WarehouseId};
use fulfillment::{CancelOrder, CancelOutcome, PlaceOrder, PlacedOrder};
use serde::Deserialize;
use store::{InventoryStore, Order};

use crate::AppState;
use crate::error::{ApiError, required};

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub quantity: Option<u32>,
}

/// POST /orders: create a pending order and reserve its single line.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlacedOrder>), ApiError> {
    let Json(req) = payload?;
    let cmd = PlaceOrder::new(
        required(req.product_id, "product_id")?,
        required(req.warehouse_id, "warehouse_id")?,
        required(req.quantity, "quantity")?,
    );

    let placed = state.service.place_order(cmd).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, id))]
pub async fn get<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<Order>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.service.get_order(id).await?))
}

/// POST /orders/{id}/cancel: release held stock and drop queued demand.
#[tracing::instrument(skip(state, id))]
pub async fn cancel<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<CancelOutcome>, ApiError> {
    let Path(id) = id?;
    Ok(Json(state.service.cancel_order(CancelOrder::new(id)).await?))
}
