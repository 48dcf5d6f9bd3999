use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{
    NewOrder, Order, OrderId, OrderStatus, OrderStore, Result, StepId, StepRecord, StepUpdate,
    StoreError,
};

#[derive(Default)]
struct InMemoryState {
    orders: HashMap<OrderId, Order>,
    steps: HashMap<StepId, StepRecord>,
}

impl InMemoryState {
    fn assemble(&self, order: &Order) -> Order {
        let mut order = order.clone();
        let mut steps: Vec<_> = self
            .steps
            .values()
            .filter(|s| s.order_id == order.id)
            .cloned()
            .collect();
        steps.sort_by_key(|s| s.execution_order);
        order.steps = steps;
        order
    }
}

/// In-memory order store implementation.
///
/// Provides the same interface as the PostgreSQL implementation and is used
/// by tests and by the API server when no database is configured.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Clears all orders and steps.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.steps.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order(&self, order: NewOrder) -> Result<Order> {
        let order = Order::from_new(OrderId::new(), order);
        self.state
            .write()
            .await
            .orders
            .insert(order.id, order.clone());
        Ok(order)
    }

    async fn create_step(
        &self,
        order_id: OrderId,
        step_name: &str,
        execution_order: u32,
    ) -> Result<StepRecord> {
        let mut state = self.state.write().await;

        if !state.orders.contains_key(&order_id) {
            return Err(StoreError::OrderNotFound(order_id));
        }

        let taken = state
            .steps
            .values()
            .any(|s| s.order_id == order_id && s.execution_order == execution_order);
        if taken {
            return Err(StoreError::DuplicateExecutionOrder {
                order_id,
                execution_order,
            });
        }

        let record = StepRecord::pending(order_id, step_name, execution_order);
        state.steps.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_step(&self, step_id: StepId, update: StepUpdate) -> Result<StepRecord> {
        let mut state = self.state.write().await;
        let record = state
            .steps
            .get_mut(&step_id)
            .ok_or(StoreError::StepNotFound(step_id))?;
        record.apply(update);
        Ok(record.clone())
    }

    async fn update_order_status(&self, order_id: OrderId, status: OrderStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.status = status;
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn record_payment(
        &self,
        order_id: OrderId,
        payment_id: &str,
        transaction_id: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let order = state
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound(order_id))?;
        order.payment_id = Some(payment_id.to_string());
        order.transaction_id = Some(transaction_id.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).map(|o| state.assemble(o)))
    }

    async fn get_step(&self, step_id: StepId) -> Result<Option<StepRecord>> {
        Ok(self.state.read().await.steps.get(&step_id).cloned())
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state.orders.values().map(|o| state.assemble(o)).collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }
}
