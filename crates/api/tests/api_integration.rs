//! Integration tests for the API server.

use std::sync::Arc;
use std::sync::OnceLock;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use metrics_exporter_prometheus::PrometheusHandle;
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

async fn setup() -> (axum::Router, Arc<api::routes::AppState>) {
    let state = api::create_default_state(&api::Config::default()).await;
    let app = api::create_app(state.clone(), get_metrics_handle());
    (app, state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn checkout_body(quantity: u32) -> serde_json::Value {
    serde_json::json!({
        "payment_method": "card-test",
        "line_items": [
            {"product_id": "p1", "quantity": quantity, "unit_price_cents": 1000},
        ],
        "shipping_address": {
            "line1": "1 Main St",
            "city": "Springfield",
            "postal_code": "12345",
            "country": "US",
        },
    })
}

#[tokio::test]
async fn test_health_check() {
    let (app, _) = setup().await;

    let response = app.oneshot(get_request("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _) = setup().await;

    let response = app.oneshot(get_request("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_stock_roundtrip() {
    let (app, _) = setup().await;

    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/tenants/t1/stock/p1",
            serde_json::json!({"stock": 25}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(get_request("/tenants/t1/stock/p1"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["stock"], 25);
    assert_eq!(body["available"], 25);
}

#[tokio::test]
async fn test_stock_missing_is_404() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(get_request("/tenants/t1/stock/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_checkout_completes_order() {
    let (app, state) = setup().await;

    app.clone()
        .oneshot(json_request(
            "PUT",
            "/tenants/t1/stock/p1",
            serde_json::json!({"stock": 10}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tenants/t1/orders",
            checkout_body(2),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["status"], "Completed");
    let order_id = body["order_id"].as_str().unwrap().to_string();

    // Stock was consumed.
    let response = app
        .clone()
        .oneshot(get_request("/tenants/t1/stock/p1"))
        .await
        .unwrap();
    let stock = response_json(response).await;
    assert_eq!(stock["stock"], 8);
    assert_eq!(stock["reserved"], 0);

    // The order is readable...
    let response = app
        .clone()
        .oneshot(get_request(&format!("/tenants/t1/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let order = response_json(response).await;
    assert_eq!(order["status"], "Completed");
    assert_eq!(order["total_cents"], 2000);

    // ...and lands in the search index once fan-out settles.
    state.bus.drain().await;
    let response = app
        .oneshot(get_request("/tenants/t1/orders"))
        .await
        .unwrap();
    let listed = response_json(response).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["order_id"], order_id.as_str());

    // The customer was notified.
    assert_eq!(state.notification_sender.sent_count(), 1);
}

#[tokio::test]
async fn test_checkout_without_stock_is_conflict() {
    let (app, _) = setup().await;

    app.clone()
        .oneshot(json_request(
            "PUT",
            "/tenants/t1/stock/p1",
            serde_json::json!({"stock": 1}),
        ))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "POST",
            "/tenants/t1/orders",
            checkout_body(5),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_checkout_with_declined_card_is_payment_required() {
    let (app, state) = setup().await;

    app.clone()
        .oneshot(json_request(
            "PUT",
            "/tenants/t1/stock/p1",
            serde_json::json!({"stock": 10}),
        ))
        .await
        .unwrap();
    state.payment.set_decline(Some("card expired"));

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tenants/t1/orders",
            checkout_body(2),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    // The hold was released.
    let response = app
        .oneshot(get_request("/tenants/t1/stock/p1"))
        .await
        .unwrap();
    let stock = response_json(response).await;
    assert_eq!(stock["stock"], 10);
    assert_eq!(stock["reserved"], 0);
}

#[tokio::test]
async fn test_checkout_with_no_items_is_bad_request() {
    let (app, _) = setup().await;

    let body = serde_json::json!({
        "payment_method": "card-test",
        "line_items": [],
        "shipping_address": {
            "line1": "1 Main St",
            "city": "Springfield",
            "postal_code": "12345",
            "country": "US",
        },
    });
    let response = app
        .oneshot(json_request("POST", "/tenants/t1/orders", body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_order_is_404() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(get_request(&format!(
            "/tenants/t1/orders/{}",
            uuid::Uuid::new_v4()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_order_id_is_400() {
    let (app, _) = setup().await;

    let response = app
        .oneshot(get_request("/tenants/t1/orders/not-a-uuid"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tenants_do_not_see_each_others_orders() {
    let (app, state) = setup().await;

    app.clone()
        .oneshot(json_request(
            "PUT",
            "/tenants/t1/stock/p1",
            serde_json::json!({"stock": 10}),
        ))
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/tenants/t1/orders",
            checkout_body(2),
        ))
        .await
        .unwrap();
    let body = response_json(response).await;
    let order_id = body["order_id"].as_str().unwrap().to_string();

    // The same order id under another tenant does not resolve.
    let response = app
        .clone()
        .oneshot(get_request(&format!("/tenants/t2/orders/{order_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    state.bus.drain().await;
    let response = app
        .oneshot(get_request("/tenants/t2/orders"))
        .await
        .unwrap();
    let listed = response_json(response).await;
    assert!(listed.as_array().unwrap().is_empty());
}
