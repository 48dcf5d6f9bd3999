//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use order_store::StoreError;
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Order store error.
    Store(StoreError),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Store(err) => store_error_to_response(err),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::OrderNotFound(_) | StoreError::StepNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        _ => {
            tracing::error!(error = %err, "order store error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    match err {
        // The saga ran and a remote service rejected the order.
        SagaError::StepExecution { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        SagaError::Store(store_err) => store_error_to_response(store_err),
        _ => {
            tracing::error!(error = %err, "saga error");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use order_store::OrderId;
    use saga::ServiceError;

    #[test]
    fn test_step_failure_is_bad_request() {
        let err = ApiError::from(SagaError::step_execution(
            "payment",
            ServiceError::rejected("payment", 400, "Insufficient funds"),
        ));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_missing_order_is_not_found() {
        let err = ApiError::from(SagaError::Store(StoreError::OrderNotFound(OrderId::new())));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_contract_violation_is_internal() {
        let err = ApiError::from(SagaError::contract_violation("missing order_id"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
