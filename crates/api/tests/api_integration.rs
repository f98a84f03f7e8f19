//! Integration tests for the API server.

use std::sync::OnceLock;
use std::time::Duration;

use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{OrderId, ProductId, StockKey, WarehouseId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, StoreOp};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup_with(config: &Config) -> (axum::Router, InMemoryStore) {
    let store = InMemoryStore::new();
    let state = api::create_state(store.clone(), "memory", config);
    (api::create_app(state, get_metrics_handle()), store)
}

fn setup() -> (axum::Router, InMemoryStore) {
    setup_with(&Config::default())
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn post(app: &axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap();
    send(app, request).await
}

async fn get(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(app, request).await
}

async fn seeded_pair(store: &InMemoryStore, quantity: u32) -> StockKey {
    let key = StockKey::new(ProductId::new(), WarehouseId::new());
    store.seed_stock(key, quantity).await;
    key
}

async fn seeded_order(store: &InMemoryStore) -> OrderId {
    let id = OrderId::new();
    store.seed_order(id).await;
    id
}

fn reserve_body(order_id: OrderId, key: StockKey, quantity: u32) -> Value {
    json!({
        "order_id": order_id,
        "product_id": key.product_id,
        "warehouse_id": key.warehouse_id,
        "quantity": quantity,
    })
}

fn assert_error(body: &Value, kind: &str, retryable: bool) {
    assert_eq!(body["error"]["kind"], kind, "body: {body}");
    assert_eq!(body["error"]["retryable"], retryable, "body: {body}");
    assert!(body["error"]["message"].as_str().is_some());
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup();

    let (status, json) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_reserve_holds_stock() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 10).await;
    let order_id = seeded_order(&store).await;

    let (status, json) = post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 3)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["reserved"], true);
    assert_eq!(json["backordered"], false);
    assert_eq!(json["reservation"]["quantity"], 3);
    assert_eq!(store.stock_quantity(key).await, Some(7));

    let (status, json) = get(&app, &format!("/fulfillment/reservations/{order_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["status"], "Reserved");
    assert_eq!(rows[0]["is_expired"], false);
}

#[tokio::test]
async fn test_reserve_backorders_when_short() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 2).await;
    let order_id = seeded_order(&store).await;

    let (status, json) = post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 5)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["backordered"], true);
    assert_eq!(json["available"], 2);
    assert_eq!(json["needed"], 5);

    let (_, json) = get(&app, &format!("/fulfillment/backorders/{order_id}")).await;
    assert_eq!(json.as_array().unwrap().len(), 1);
    assert_eq!(json[0]["status"], "Pending");
}

#[tokio::test]
async fn test_reserve_missing_field_is_bad_request() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 10).await;

    let (status, json) = post(
        &app,
        "/fulfillment/reserve",
        json!({ "product_id": key.product_id, "warehouse_id": key.warehouse_id, "quantity": 1 }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, "validation", false);
    assert!(json["error"]["message"].as_str().unwrap().contains("order_id"));
    assert_eq!(store.stock_quantity(key).await, Some(10));
}

#[tokio::test]
async fn test_reserve_zero_quantity_is_rejected() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 10).await;
    let order_id = seeded_order(&store).await;

    let (status, json) = post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 0)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, "validation", false);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let (app, _) = setup();
    let request = Request::builder()
        .method("POST")
        .uri("/fulfillment/ship")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, "validation", false);
}

#[tokio::test]
async fn test_reserve_unknown_pair_is_not_found() {
    let (app, store) = setup();
    let order_id = seeded_order(&store).await;
    let key = StockKey::new(ProductId::new(), WarehouseId::new());

    let (status, json) = post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 1)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&json, "not_found", false);
}

#[tokio::test]
async fn test_ship_then_nothing_to_ship() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 10).await;
    let order_id = seeded_order(&store).await;
    post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 4)).await;

    let (status, json) = post(
        &app,
        "/fulfillment/ship",
        json!({ "order_id": order_id, "ship_date": "2026-03-01T12:00:00Z" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["shipped"], true);
    assert_eq!(json["ship_date"], "2026-03-01T12:00:00Z");
    assert_eq!(json["reservations"].as_array().unwrap().len(), 1);

    let (_, order) = get(&app, &format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "Shipped");

    let (status, json) = post(&app, "/fulfillment/ship", json!({ "order_id": order_id })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&json, "not_found", false);
}

#[tokio::test]
async fn test_receive_then_process_backorders() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 0).await;
    let first = seeded_order(&store).await;
    let second = seeded_order(&store).await;
    post(&app, "/fulfillment/reserve", reserve_body(first, key, 5)).await;
    tokio::time::sleep(Duration::from_millis(5)).await;
    post(&app, "/fulfillment/reserve", reserve_body(second, key, 3)).await;

    let (status, json) = post(
        &app,
        "/stock/receive",
        json!({ "product_id": key.product_id, "warehouse_id": key.warehouse_id, "quantity": 6 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["on_hand"], 6);
    assert!(json["backorders"].is_null());

    let (status, json) = post(
        &app,
        "/fulfillment/process-backorders",
        json!({ "product_id": key.product_id, "warehouse_id": key.warehouse_id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["fulfilled"].as_array().unwrap().len(), 1);
    assert_eq!(json["partial"].as_array().unwrap().len(), 1);
    assert_eq!(json["remaining_stock"], 1);

    let (_, order) = get(&app, &format!("/orders/{first}")).await;
    assert_eq!(order["status"], "Processing");
    let (_, order) = get(&app, &format!("/orders/{second}")).await;
    assert_eq!(order["status"], "Backordered");
}

#[tokio::test]
async fn test_transfer_moves_stock() {
    let (app, store) = setup();
    let source = seeded_pair(&store, 10).await;
    let destination = WarehouseId::new();

    let (status, json) = post(
        &app,
        "/stock/transfer",
        json!({
            "product_id": source.product_id,
            "quantity": 4,
            "source_warehouse_id": source.warehouse_id,
            "destination_warehouse_id": destination,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["transferred"], true);
    assert_eq!(json["source_remaining"], 6);
    assert_eq!(json["destination_quantity"], 4);

    let uri = format!("/stock-movements?product_id={}&limit=5", source.product_id);
    let (status, json) = get(&app, &uri).await;
    assert_eq!(status, StatusCode::OK);
    let movements = json.as_array().unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["status"], "Completed");

    let (_, json) = get(&app, "/stock").await;
    assert_eq!(json.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_transfer_rejections() {
    let (app, store) = setup();
    let source = seeded_pair(&store, 3).await;

    let (status, json) = post(
        &app,
        "/stock/transfer",
        json!({
            "product_id": source.product_id,
            "quantity": 5,
            "source_warehouse_id": source.warehouse_id,
            "destination_warehouse_id": WarehouseId::new(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, "insufficient_stock", false);

    let (status, json) = post(
        &app,
        "/stock/transfer",
        json!({
            "product_id": source.product_id,
            "quantity": 1,
            "source_warehouse_id": source.warehouse_id,
            "destination_warehouse_id": source.warehouse_id,
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, "validation", false);
    assert_eq!(store.stock_quantity(source).await, Some(3));
}

#[tokio::test]
async fn test_transfer_failure_restores_source() {
    let (app, store) = setup();
    let source = seeded_pair(&store, 10).await;
    store.fail_on(StoreOp::InsertStock);

    let (status, json) = post(
        &app,
        "/stock/transfer",
        json!({
            "product_id": source.product_id,
            "quantity": 4,
            "source_warehouse_id": source.warehouse_id,
            "destination_warehouse_id": WarehouseId::new(),
        }),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_error(&json, "store_write", true);
    assert_eq!(store.stock_quantity(source).await, Some(10));
}

#[tokio::test]
async fn test_store_timeout_is_service_unavailable() {
    let config = Config {
        store_timeout_ms: 20,
        ..Config::default()
    };
    let (app, store) = setup_with(&config);
    let key = seeded_pair(&store, 10).await;
    let order_id = seeded_order(&store).await;
    store.set_latency(Duration::from_millis(100));

    let (status, json) = post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 1)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_error(&json, "store_timeout", true);
}

#[tokio::test]
async fn test_place_and_cancel_order() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 5).await;

    let (status, json) = post(
        &app,
        "/orders",
        json!({ "product_id": key.product_id, "warehouse_id": key.warehouse_id, "quantity": 5 }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["outcome"], "reserved");
    let order_id = json["order_id"].as_str().unwrap().to_string();
    assert_eq!(store.stock_quantity(key).await, Some(0));

    let (status, json) = post(&app, &format!("/orders/{order_id}/cancel"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["released"].as_array().unwrap().len(), 1);
    assert_eq!(store.stock_quantity(key).await, Some(5));

    let (_, order) = get(&app, &format!("/orders/{order_id}")).await;
    assert_eq!(order["status"], "Cancelled");
}

#[tokio::test]
async fn test_unknown_order_and_bad_id() {
    let (app, _) = setup();

    let (status, json) = get(&app, &format!("/orders/{}", OrderId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_error(&json, "not_found", false);

    let (status, json) = get(&app, "/fulfillment/reservations/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_error(&json, "validation", false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, store) = setup();
    let key = seeded_pair(&store, 10).await;
    let order_id = seeded_order(&store).await;
    post(&app, "/fulfillment/reserve", reserve_body(order_id, key, 1)).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("fulfillment_reservations_total"));
}
