//! HTTP API server with observability for the order fulfillment platform.
//!
//! Exposes checkout (which runs the fulfillment saga synchronously),
//! order and stock queries, and admin restocking, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use common::{OrderId, ProductId};
use domain::Order;
use event_bus::{EventBus, InMemoryEventBus};
use inventory::{InventoryRecord, ReservationEngine, ReservationKey, ReservationRecord};
use ledger::{ApplyLedger, InMemoryApplyLedger};
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{
    InMemoryNotificationSender, NotificationDispatch, NotificationSender, SearchIndexView,
};
use saga::{InMemoryPaymentGateway, InMemoryShippingService, RetryPolicy, SagaCoordinator};
use store::InMemoryStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
use routes::AppState;

/// Reservation engine over the in-memory stores.
pub type DefaultEngine = ReservationEngine<
    InMemoryStore<ProductId, InventoryRecord>,
    InMemoryStore<ReservationKey, ReservationRecord>,
>;

/// Saga coordinator over the in-memory stores and service doubles.
pub type DefaultCoordinator = SagaCoordinator<
    InMemoryStore<OrderId, Order>,
    Arc<DefaultEngine>,
    InMemoryPaymentGateway,
    InMemoryShippingService,
>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/tenants/{tenant}/orders", post(routes::orders::create))
        .route("/tenants/{tenant}/orders", get(routes::orders::list))
        .route("/tenants/{tenant}/orders/{id}", get(routes::orders::get))
        .route(
            "/tenants/{tenant}/orders/{id}/resume",
            post(routes::orders::resume),
        )
        .route("/tenants/{tenant}/stock/{product}", put(routes::stock::set))
        .route("/tenants/{tenant}/stock/{product}", get(routes::stock::get))
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

/// Creates the default application state: in-memory stores, the real
/// reservation engine and coordinator, and projection consumers
/// subscribed on the bus.
pub async fn create_default_state(config: &Config) -> Arc<AppState> {
    let bus = Arc::new(InMemoryEventBus::new());

    let engine = Arc::new(ReservationEngine::new(
        InMemoryStore::new(),
        InMemoryStore::new(),
        bus.clone() as Arc<dyn EventBus>,
        config.low_stock_threshold,
    ));

    let payment = InMemoryPaymentGateway::new();
    let shipping = InMemoryShippingService::new();
    let coordinator = SagaCoordinator::new(
        InMemoryStore::new(),
        engine.clone(),
        payment.clone(),
        shipping.clone(),
        bus.clone() as Arc<dyn EventBus>,
        RetryPolicy::default(),
    );

    let apply_ledger = Arc::new(InMemoryApplyLedger::new());
    let search_index = SearchIndexView::shared();
    let notification_sender = Arc::new(InMemoryNotificationSender::new());
    let notifications = Arc::new(NotificationDispatch::new(
        notification_sender.clone() as Arc<dyn NotificationSender>,
    ));

    projections::register_consumers(
        bus.as_ref(),
        apply_ledger as Arc<dyn ApplyLedger>,
        search_index.clone(),
        notifications,
    )
    .await
    .expect("failed to register projection consumers");

    Arc::new(AppState {
        coordinator,
        engine,
        search_index,
        payment,
        shipping,
        bus,
        notification_sender,
    })
}
