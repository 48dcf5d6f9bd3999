//! Saga error types.

use order_store::StoreError;
use thiserror::Error;

/// Status used for transport-level failures (no response from the service).
pub const UNAVAILABLE_STATUS: u16 = 500;

/// A remote service call failed.
///
/// Business rejections (insufficient funds, out of stock, ...) and transport
/// faults are reported the same way; only the status and message differ.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service} service error ({status}): {message}")]
pub struct ServiceError {
    /// Remote domain, e.g. `"payment"`.
    pub service: &'static str,
    /// HTTP-style status code.
    pub status: u16,
    pub message: String,
}

impl ServiceError {
    /// The service answered and rejected the request.
    pub fn rejected(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self {
            service,
            status,
            message: message.into(),
        }
    }

    /// The service could not be reached or did not answer in time.
    pub fn unavailable(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            status: UNAVAILABLE_STATUS,
            message: format!("service unavailable: {}", message.into()),
        }
    }
}

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step's forward call failed. Aborts the saga and triggers compensation.
    #[error("Step '{step}' failed: {source}")]
    StepExecution {
        step: String,
        #[source]
        source: ServiceError,
    },

    /// A step's compensating call failed. Recorded on the step, never returned
    /// from a saga run.
    #[error("Compensation of step '{step}' failed: {source}")]
    Compensation {
        step: String,
        #[source]
        source: ServiceError,
    },

    /// A step was used against a context or lifecycle it does not support.
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// Order store error.
    #[error("Order store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An HTTP service client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl SagaError {
    pub fn step_execution(step: impl Into<String>, source: ServiceError) -> Self {
        SagaError::StepExecution {
            step: step.into(),
            source,
        }
    }

    pub fn compensation(step: impl Into<String>, source: ServiceError) -> Self {
        SagaError::Compensation {
            step: step.into(),
            source,
        }
    }

    pub fn contract_violation(message: impl Into<String>) -> Self {
        SagaError::ContractViolation(message.into())
    }

    /// Returns the remote error carried by a step or compensation failure.
    pub fn service_error(&self) -> Option<&ServiceError> {
        match self {
            SagaError::StepExecution { source, .. } | SagaError::Compensation { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
