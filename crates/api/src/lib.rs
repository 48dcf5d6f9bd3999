//! HTTP checkout API driving the saga coordinator.
//!
//! Provides REST endpoints that create orders and run the checkout saga,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore, StoreError};
use saga::{
    CheckoutServices, HttpInventoryService, HttpPaymentService, HttpShippingService,
    InMemoryInventoryService, InMemoryPaymentService, InMemoryShippingService, SagaError,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/orders",
            get(routes::orders::list).post(routes::orders::create),
        )
        .route("/orders/{id}", get(routes::orders::get))
        .with_state(state)
        .merge(routes::metrics::router(metrics_handle))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates application state with an in-memory store and in-memory services.
pub fn create_default_state() -> Arc<AppState> {
    create_state_with(
        Arc::new(InMemoryOrderStore::new()),
        CheckoutServices::new(
            Arc::new(InMemoryPaymentService::new()),
            Arc::new(InMemoryInventoryService::new()),
            Arc::new(InMemoryShippingService::new()),
        ),
    )
}

/// Creates application state over the given collaborators.
pub fn create_state_with(store: Arc<dyn OrderStore>, services: CheckoutServices) -> Arc<AppState> {
    Arc::new(AppState {
        store,
        services,
        store_kind: "memory",
    })
}

/// Creates application state from configuration: PostgreSQL when a database
/// URL is configured, remote services over HTTP with the configured timeout.
pub async fn create_state(config: &Config) -> Result<Arc<AppState>, SagaError> {
    let timeout = config.service_timeout();
    let services = CheckoutServices::new(
        Arc::new(HttpPaymentService::with_timeout(
            &config.payment_service_url,
            timeout,
        )?),
        Arc::new(HttpInventoryService::with_timeout(
            &config.inventory_service_url,
            timeout,
        )?),
        Arc::new(HttpShippingService::with_timeout(
            &config.shipping_service_url,
            timeout,
        )?),
    );

    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, orders are kept in memory");
        return Ok(create_state_with(
            Arc::new(InMemoryOrderStore::new()),
            services,
        ));
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .map_err(StoreError::from)?;
    let store = PostgresOrderStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("connected to PostgreSQL order store");

    Ok(Arc::new(AppState {
        store: Arc::new(store),
        services,
        store_kind: "postgres",
    }))
}
