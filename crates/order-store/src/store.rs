use async_trait::async_trait;

use crate::{NewOrder, Order, OrderId, OrderStatus, Result, StepId, StepRecord, StepUpdate};

/// Core trait for order store implementations.
///
/// All calls are durable once they return. Implementations must be safe to
/// share between sagas of different orders (Send + Sync); the store does not
/// serialize concurrent sagas of the same order.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order in `Pending` status.
    async fn create_order(&self, order: NewOrder) -> Result<Order>;

    /// Creates a `Pending` step record for an order.
    ///
    /// Fails with `DuplicateExecutionOrder` if the position is already taken.
    async fn create_step(
        &self,
        order_id: OrderId,
        step_name: &str,
        execution_order: u32,
    ) -> Result<StepRecord>;

    /// Applies a status change to a step record and returns the updated record.
    async fn update_step(&self, step_id: StepId, update: StepUpdate) -> Result<StepRecord>;

    /// Updates the aggregate status of an order.
    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()>;

    /// Stores the payment references produced by a successful charge.
    async fn record_payment(
        &self,
        order_id: OrderId,
        payment_id: &str,
        transaction_id: &str,
    ) -> Result<()>;

    /// Loads an order with its step records ordered by execution order.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads a single step record.
    async fn get_step(&self, step_id: StepId) -> Result<Option<StepRecord>>;

    /// Lists all orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;
}
