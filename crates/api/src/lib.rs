//! HTTP API server with observability for the stock fulfillment engine.
//!
//! Exposes reservation, shipment, backorder, transfer and order endpoints
//! over a [`FulfillmentService`], with structured logging (tracing) and
//! Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use fulfillment::FulfillmentService;
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InventoryStore, TimeoutStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub service: FulfillmentService<S>,
    /// Name of the backing store, reported by `/health`.
    pub backend: &'static str,
}

/// Wraps `store` in the configured per-call timeout and builds the service.
pub fn create_state<S>(
    store: S,
    backend: &'static str,
    config: &Config,
) -> Arc<AppState<TimeoutStore<S>>>
where
    S: InventoryStore + Clone + 'static,
{
    let store = TimeoutStore::new(store, config.store_timeout());
    Arc::new(AppState {
        service: FulfillmentService::new(store, config.fulfillment()),
        backend,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: InventoryStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/fulfillment/reserve", post(routes::fulfillment::reserve::<S>))
        .route("/fulfillment/ship", post(routes::fulfillment::ship::<S>))
        .route(
            "/fulfillment/process-backorders",
            post(routes::fulfillment::process_backorders::<S>),
        )
        .route(
            "/fulfillment/reservations/{order_id}",
            get(routes::fulfillment::reservations::<S>),
        )
        .route(
            "/fulfillment/backorders/{order_id}",
            get(routes::fulfillment::backorders::<S>),
        )
        .route("/stock", get(routes::stock::list::<S>))
        .route("/stock/transfer", post(routes::stock::transfer::<S>))
        .route("/stock/receive", post(routes::stock::receive::<S>))
        .route("/stock-movements", get(routes::stock::movements::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
