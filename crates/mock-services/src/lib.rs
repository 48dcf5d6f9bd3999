//! Mock remote services the checkout saga talks to.
//!
//! Each service is an Axum router over in-memory state. Rejections are
//! answered with a JSON body of the form `{"detail": "..."}`.

pub mod error;
pub mod inventory;
pub mod payment;
pub mod shipping;

use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::json;

pub use error::MockError;

/// Payment service router with empty state.
pub fn payment_router() -> Router {
    payment::router(payment::PaymentState::default())
}

/// Inventory service router seeded with the default catalog.
pub fn inventory_router() -> Router {
    inventory::router(inventory::InventoryState::seeded())
}

/// Shipping service router with empty state.
pub fn shipping_router() -> Router {
    shipping::router(shipping::ShippingState::default())
}

pub(crate) fn health_routes<S: Clone + Send + Sync + 'static>() -> Router<S> {
    Router::new().route(
        "/health",
        get(|| async { Json(json!({ "status": "healthy" })) }),
    )
}
