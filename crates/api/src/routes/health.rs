//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::routes::orders::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Order store backend, `"memory"` or `"postgres"`.
    pub store: &'static str,
}

/// GET /health: reports liveness and the order store in use.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        store: state.store_kind,
    })
}
