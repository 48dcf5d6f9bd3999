use thiserror::Error;

use crate::{OrderId, StepId};

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The step record was not found.
    #[error("Step record not found: {0}")]
    StepNotFound(StepId),

    /// A step with the same execution order is already registered for the order.
    #[error("Order {order_id} already has a step at execution order {execution_order}")]
    DuplicateExecutionOrder {
        order_id: OrderId,
        execution_order: u32,
    },

    /// A persisted value could not be decoded.
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
