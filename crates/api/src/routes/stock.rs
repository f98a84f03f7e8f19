//! Stock ledger endpoints: transfers, receipts and the movement audit trail.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use common::{OrderId, ProductId, WarehouseId};
use fulfillment::{ReceiptOutcome, ReceiveStock, Restock, TransferOutcome, TransferStock};
use serde::{Deserialize, Serialize};
use store::{InventoryStore, MovementFilter, StockEntry, StockMovement};

use crate::AppState;
use crate::error::{ApiError, required};

/// Upper bound on movements returned by one query.
const MAX_MOVEMENTS: usize = 1000;

#[derive(Deserialize)]
pub struct TransferRequest {
    pub product_id: Option<ProductId>,
    pub quantity: Option<u32>,
    pub source_warehouse_id: Option<WarehouseId>,
    pub destination_warehouse_id: Option<WarehouseId>,
    #[serde(default)]
    pub drain_backorders: bool,
}

#[derive(Deserialize)]
pub struct ReceiveRequest {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub quantity: Option<u32>,
    #[serde(default)]
    pub drain_backorders: bool,
}

#[derive(Deserialize)]
pub struct MovementQuery {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub order_id: Option<OrderId>,
    pub limit: Option<usize>,
}

impl From<MovementQuery> for MovementFilter {
    fn from(query: MovementQuery) -> Self {
        let mut filter = MovementFilter::new()
            .limit(query.limit.unwrap_or(MAX_MOVEMENTS).min(MAX_MOVEMENTS));
        if let Some(product_id) = query.product_id {
            filter = filter.product(product_id);
        }
        if let Some(warehouse_id) = query.warehouse_id {
            filter = filter.warehouse(warehouse_id);
        }
        if let Some(order_id) = query.order_id {
            filter = filter.order(order_id);
        }
        filter
    }
}

#[derive(Serialize)]
pub struct TransferResponse {
    pub transferred: bool,
    #[serde(flatten)]
    pub restock: Restock<TransferOutcome>,
}

/// POST /stock/transfer: move stock between two warehouses.
#[tracing::instrument(skip(state, payload))]
pub async fn transfer<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<TransferResponse>, ApiError> {
    let Json(req) = payload?;
    let mut cmd = TransferStock::new(
        required(req.product_id, "product_id")?,
        required(req.quantity, "quantity")?,
        required(req.source_warehouse_id, "source_warehouse_id")?,
        required(req.destination_warehouse_id, "destination_warehouse_id")?,
    );
    if req.drain_backorders {
        cmd = cmd.draining();
    }

    let restock = state.service.transfer_stock(cmd).await?;
    Ok(Json(TransferResponse {
        transferred: true,
        restock,
    }))
}

/// POST /stock/receive: book incoming goods at a warehouse.
#[tracing::instrument(skip(state, payload))]
pub async fn receive<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<ReceiveRequest>, JsonRejection>,
) -> Result<Json<Restock<ReceiptOutcome>>, ApiError> {
    let Json(req) = payload?;
    let mut cmd = ReceiveStock::new(
        required(req.product_id, "product_id")?,
        required(req.warehouse_id, "warehouse_id")?,
        required(req.quantity, "quantity")?,
    );
    if req.drain_backorders {
        cmd = cmd.draining();
    }

    Ok(Json(state.service.receive_stock(cmd).await?))
}

/// GET /stock
#[tracing::instrument(skip(state))]
pub async fn list<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<StockEntry>>, ApiError> {
    Ok(Json(state.service.list_stock().await?))
}

/// GET /stock-movements: audit trail, newest first.
#[tracing::instrument(skip(state, query))]
pub async fn movements<S: InventoryStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    query: Result<Query<MovementQuery>, QueryRejection>,
) -> Result<Json<Vec<StockMovement>>, ApiError> {
    let Query(query) = query?;
    Ok(Json(state.service.list_movements(query.into()).await?))
}
