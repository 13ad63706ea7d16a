//! HTTP API server with observability for the order pipeline.
//!
//! Provides REST endpoints for checkout, order queries, status changes and
//! cancellation, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post, put};
use dispatch::{Dispatcher, Notifier, SearchIndexer, TracingNotifier, TracingSearchIndex};
use domain::OrderService;
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cache::ResponseCache;
use config::Config;
use routes::orders::{AppState, ORDER_SUMMARY};

const MIN_PURGE_INTERVAL: Duration = Duration::from_secs(1);

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            post(routes::orders::create::<S>).get(routes::orders::list::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", put(routes::orders::update_status::<S>))
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

/// Creates the application state over `store`.
///
/// Side effects are only logged; deployments that talk to real notification
/// and search modules use [`create_state`] with their own collaborators.
/// Must be called inside a Tokio runtime, which runs the dispatch workers
/// and the cache purger.
pub fn create_default_state<S: Store + 'static>(store: S, config: &Config) -> Arc<AppState<S>> {
    create_state(
        store,
        config,
        Arc::new(TracingNotifier),
        Arc::new(TracingSearchIndex),
    )
}

/// Creates the application state with explicit side-effect collaborators.
pub fn create_state<S: Store + 'static>(
    store: S,
    config: &Config,
    notifier: Arc<dyn Notifier>,
    indexer: Arc<dyn SearchIndexer>,
) -> Arc<AppState<S>> {
    let dispatcher = Arc::new(Dispatcher::start(config.dispatch, notifier, indexer));

    let order_service = OrderService::with_publisher(store, Arc::clone(&dispatcher))
        .with_lifecycle(config.lifecycle);

    let cache = Arc::new(
        ResponseCache::new(config.cache_ttl).with_ttl(ORDER_SUMMARY, config.cache_ttl),
    );
    cache.spawn_purger(config.cache_ttl.max(MIN_PURGE_INTERVAL));

    Arc::new(AppState {
        order_service,
        dispatcher,
        cache,
    })
}
