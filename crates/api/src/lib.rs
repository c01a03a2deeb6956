//! HTTP API server for the product catalog.
//!
//! Provides REST endpoints for product and variant reads and writes, an
//! ingest endpoint feeding the listener pipeline, and a background task
//! that drains the store's change feed into the trigger pipeline. Logging
//! goes through tracing and metrics are exported for Prometheus.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, patch, post, put};
use domain::ProductService;
use metrics_exporter_prometheus::PrometheusHandle;
use pipeline::{ConfigError, LogPublisher, Pipeline, PipelineConfig};
use projections::CatalogReader;
use record_store::{ChangeFeed, RecordStore};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: RecordStore> {
    pub products: ProductService<S>,
    pub catalog: CatalogReader<S>,
    pub listener: Pipeline<S>,
    pub trigger: Pipeline<S>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: RecordStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/events", post(routes::events::ingest::<S>))
        .route("/products", get(routes::products::list::<S>))
        .route(
            "/products/category/{category}",
            get(routes::products::list_category::<S>),
        )
        .route(
            "/products/{id}",
            get(routes::products::get::<S>)
                .put(routes::products::save::<S>)
                .delete(routes::products::delete::<S>),
        )
        .route(
            "/products/{id}/stock",
            patch(routes::products::update_stock::<S>),
        )
        .route(
            "/products/{id}/price",
            patch(routes::products::update_price::<S>),
        )
        .route(
            "/products/{id}/variants/{variant_id}",
            put(routes::variants::save::<S>).delete(routes::variants::delete::<S>),
        )
        .route(
            "/products/{id}/variants/{variant_id}/stock",
            patch(routes::variants::update_stock::<S>),
        )
        .route(
            "/products/{id}/variants/{variant_id}/price",
            patch(routes::variants::update_price::<S>),
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

/// Creates the default application state over `store`.
///
/// Derived events are written to the log; scan rows go to an in-memory sink.
pub fn create_default_state<S: RecordStore + Clone + 'static>(
    store: S,
    config: &Config,
) -> Result<Arc<AppState<S>>, ConfigError> {
    let pipeline_config = Arc::new(
        PipelineConfig::catalog()?
            .with_region(config.region.clone())
            .with_event_timeout(config.event_timeout),
    );

    let products = ProductService::new(store.clone()).with_region(config.region.clone());
    let catalog = CatalogReader::new(store.clone());
    let listener = Pipeline::listener(store.clone(), pipeline_config.clone());
    let trigger =
        Pipeline::trigger(store, pipeline_config).with_publisher(Arc::new(LogPublisher));

    Ok(Arc::new(AppState {
        products,
        catalog,
        listener,
        trigger,
    }))
}

/// Spawns the task that feeds confirmed store changes to the trigger
/// pipeline every `every`.
pub fn spawn_change_poller<S>(trigger: Pipeline<S>, every: Duration) -> JoinHandle<()>
where
    S: RecordStore + ChangeFeed + Clone + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let report = trigger.drain_changes().await;
            if report.is_empty() {
                continue;
            }
            let failed = report.failures().count();
            if failed > 0 {
                tracing::warn!(changes = report.len(), failed, "change batch had failures");
            } else {
                tracing::debug!(changes = report.len(), "change batch processed");
            }
        }
    })
}
