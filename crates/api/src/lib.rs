//! HTTP API server for the record store order workflow.
//!
//! Exposes the cart, checkout, payment and admin endpoints with
//! structured logging (tracing) and Prometheus metrics. Handlers are
//! generic over the store backend so the same router serves the
//! in-memory store in tests and Postgres in production.

pub mod config;
pub mod error;
pub mod identity;
pub mod response;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post, put};
use checkout::{
    CheckoutConfig, InMemoryPaymentGateway, OrderWorkflow, PaymentsService, TracingEventSink,
};
use domain::SystemClock;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Stores;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Stores + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart", delete(routes::cart::clear::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/cart/items/{album_id}", put(routes::cart::update_item::<S>))
        .route(
            "/cart/items/{album_id}",
            delete(routes::cart::remove_item::<S>),
        )
        .route("/cart/coupon", post(routes::cart::apply_coupon::<S>))
        .route("/cart/coupon", delete(routes::cart::remove_coupon::<S>))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/payments/create-intent",
            post(routes::payments::create_intent::<S>),
        )
        .route("/payments/webhook", post(routes::payments::webhook::<S>))
        .route(
            "/admin/orders/{id}/status",
            put(routes::admin::update_order_status::<S>),
        )
        .route(
            "/admin/inventory/{album_id}/stock",
            put(routes::admin::set_stock::<S>),
        )
        .route(
            "/admin/inventory/{album_id}/add-stock",
            post(routes::admin::add_stock::<S>),
        )
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

/// Creates the default application state: the given store backend, the
/// in-memory payment gateway, the system clock and the tracing event
/// sink.
pub fn create_default_state<S: Stores + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    let gateway = InMemoryPaymentGateway::new();
    let clock = Arc::new(SystemClock);
    let events = Arc::new(TracingEventSink);
    let config = CheckoutConfig::default();

    let workflow = OrderWorkflow::new(
        store.clone(),
        gateway.clone(),
        config,
        clock.clone(),
        events.clone(),
    );
    let payments = PaymentsService::new(store.clone(), gateway.clone(), clock.clone(), events);

    Arc::new(AppState {
        workflow,
        payments,
        gateway,
        store,
        clock,
    })
}
