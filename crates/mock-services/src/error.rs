//! Error responses shared by the mock services.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// A rejection returned to the caller as `{"detail": message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockError {
    pub status: StatusCode,
    pub detail: String,
}

impl MockError {
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        tracing::warn!(status = self.status.as_u16(), detail = %self.detail, "request rejected");
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}
