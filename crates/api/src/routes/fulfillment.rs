//! Reservation, shipment and backorder endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, WarehouseId};
use fulfillment::{
    DrainBackorders, DrainReport, ReservationView, ReserveOutcome, ReserveStock, ShipOrder,
    ShipmentOutcome,
};
use serde::{Deserialize, Serialize};
use store::{Backorder, InventoryStore, Reservation};

use crate::AppState;
use crate::error::{ApiError, required};

// -- Request types --

#[derive(Deserialize)]
pub struct ReserveRequest {
    pub order_id: Option<OrderId>,
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub quantity: Option<u32>,
}

#[derive(Deserialize)]
pub struct ShipRequest {
    pub order_id: Option<OrderId>,
    pub ship_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct DrainRequest {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
}

// -- Response types --

/// Either `reserved` or `backordered` is true, never both.
#[derive(Serialize)]
pub struct ReserveResponse {
    pub reserved: bool,
    pub backordered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reservation: Option<Reservation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backorder: Option<Backorder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub needed: Option<u32>,
}

impl From<ReserveOutcome> for ReserveResponse {
    fn from(outcome: ReserveOutcome) -> Self {
        match outcome {
            ReserveOutcome::Reserved { reservation } => ReserveResponse {
                reserved: true,
                backordered: false,
                reservation: Some(reservation),
                backorder: None,
                available: None,
                needed: None,
            },
            ReserveOutcome::Backordered { backorder } => ReserveResponse {
                reserved: false,
                backordered: true,
                available: Some(backorder.quantity_available_at_creation),
                needed: Some(backorder.quantity_needed),
                reservation: None,
                backorder: Some(backorder),
            },
        }
    }
}

#[derive(Serialize)]
pub struct ShipResponse {
    pub shipped: bool,
    #[serde(flatten)]
    pub outcome: ShipmentOutcome,
}

// -- Handlers --

/// POST /fulfillment/reserve: hold stock for an order line or queue a backorder.
#[tracing::instrument(skip(state, payload))]
pub async fn reserve<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<ReserveRequest>, JsonRejection>,
) -> Result<Json<ReserveResponse>, ApiError> {
    let Json(req) = payload?;
    let cmd = ReserveStock::new(
        required(req.order_id, "order_id")?,
        required(req.product_id, "product_id")?,
        required(req.warehouse_id, "warehouse_id")?,
        required(req.quantity, "quantity")?,
    );

    let outcome = state.service.reserve(cmd).await?;
    Ok(Json(outcome.into()))
}

/// POST /fulfillment/ship: ship every active reservation of an order.
#[tracing::instrument(skip(state, payload))]
pub async fn ship<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<ShipRequest>, JsonRejection>,
) -> Result<Json<ShipResponse>, ApiError> {
    let Json(req) = payload?;
    let mut cmd = ShipOrder::new(required(req.order_id, "order_id")?);
    if let Some(ship_date) = req.ship_date {
        cmd = cmd.at(ship_date);
    }

    let outcome = state.service.ship(cmd).await?;
    Ok(Json(ShipResponse {
        shipped: true,
        outcome,
    }))
}

/// POST /fulfillment/process-backorders: drain a pair's queue oldest first.
#[tracing::instrument(skip(state, payload))]
pub async fn process_backorders<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<DrainRequest>, JsonRejection>,
) -> Result<Json<DrainReport>, ApiError> {
    let Json(req) = payload?;
    let cmd = DrainBackorders::new(
        required(req.product_id, "product_id")?,
        required(req.warehouse_id, "warehouse_id")?,
    );

    Ok(Json(state.service.drain_backorders(cmd).await?))
}

/// GET /fulfillment/reservations/{order_id}
#[tracing::instrument(skip(state, order_id))]
pub async fn reservations<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<Vec<ReservationView>>, ApiError> {
    let Path(order_id) = order_id?;
    Ok(Json(state.service.reservations_for_order(order_id).await?))
}

/// GET /fulfillment/backorders/{order_id}
#[tracing::instrument(skip(state, order_id))]
pub async fn backorders<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    order_id: Result<Path<OrderId>, PathRejection>,
) -> Result<Json<Vec<Backorder>>, ApiError> {
    let Path(order_id) = order_id?;
    Ok(Json(state.service.backorders_for_order(order_id).await?))
}
