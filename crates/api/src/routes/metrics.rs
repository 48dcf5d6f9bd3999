//! Prometheus metrics endpoint.

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Router serving `GET /metrics` from the installed recorder.
pub fn router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(render)).with_state(handle)
}

/// GET /metrics: saga counters and durations in Prometheus text format.
pub async fn render(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (StatusCode::OK, [(header::CONTENT_TYPE, CONTENT_TYPE)], handle.render())
}
