//! HTTP API server with observability for the storefront checkout.
//!
//! Provides REST endpoints for carts, checkout and orders, with structured
//! logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, patch, post, put};
use checkout::{CartService, CheckoutCoordinator, OrderService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{CartStore, OrderStore, ProductStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Any store backing every capability the API needs.
pub trait StorefrontStore: CartStore + ProductStore + OrderStore + Clone + 'static {}

impl<T> StorefrontStore for T where T: CartStore + ProductStore + OrderStore + Clone + 'static {}

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub carts: CartService<S>,
    pub orders: OrderService<S>,
    pub coordinator: CheckoutCoordinator<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: StorefrontStore>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::system::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::system::health))
        .route(
            "/cart",
            get(routes::cart::get::<S>).post(routes::cart::add_item::<S>),
        )
        .route(
            "/cart/items/{id}",
            put(routes::cart::update_item::<S>).delete(routes::cart::remove_item::<S>),
        )
        .route("/orders/checkout", post(routes::orders::checkout::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/admin/orders", get(routes::admin::list_orders::<S>))
        .route(
            "/admin/orders/{id}/status",
            patch(routes::admin::update_status::<S>),
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

/// Creates the application state over a store.
///
/// `checkout_deadline` bounds each checkout's unit of work; `None` lets it
/// run to completion.
pub fn create_state<S: StorefrontStore>(
    store: S,
    checkout_deadline: Option<Duration>,
) -> Arc<AppState<S>> {
    let coordinator = CheckoutCoordinator::new(store.clone());
    let coordinator = match checkout_deadline {
        Some(deadline) => coordinator.with_deadline(deadline),
        None => coordinator,
    };

    Arc::new(AppState {
        carts: CartService::new(store.clone()),
        orders: OrderService::new(store),
        coordinator,
    })
}
