//! Checkout and order query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use common::{CustomerId, LineItem, Money, ShippingAddress};
use order_store::{NewOrder, Order, OrderId, OrderStore, StepRecord};
use saga::CheckoutServices;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub store: Arc<dyn OrderStore>,
    pub services: CheckoutServices,
    /// Reported by the health check.
    pub store_kind: &'static str,
}

// -- Request types --

fn default_payment_method() -> String {
    "credit_card".to_string()
}

fn default_quantity() -> u32 {
    1
}

/// Largest accepted unit price in dollars.
pub const MAX_UNIT_PRICE: f64 = 1_000_000_000.0;

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub customer_id: String,
    pub items: Vec<ItemRequest>,
    pub shipping_address: ShippingAddress,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

#[derive(Deserialize)]
pub struct ItemRequest {
    pub product_id: String,
    pub name: String,
    /// Unit price in dollars.
    pub price: f64,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

impl CreateOrderRequest {
    fn into_new_order(self) -> Result<NewOrder, ApiError> {
        if self.customer_id.trim().is_empty() {
            return Err(ApiError::BadRequest("customer_id is required".to_string()));
        }
        if self.items.is_empty() {
            return Err(ApiError::BadRequest(
                "Order must contain at least one item".to_string(),
            ));
        }

        let items = self
            .items
            .into_iter()
            .map(|item| {
                if item.quantity == 0 {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid quantity for {}: must be at least 1",
                        item.product_id
                    )));
                }
                if !item.price.is_finite() || item.price < 0.0 {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid price for {}: must be non-negative",
                        item.product_id
                    )));
                }
                if item.price > MAX_UNIT_PRICE {
                    return Err(ApiError::BadRequest(format!(
                        "Invalid price for {}: must not exceed {MAX_UNIT_PRICE}",
                        item.product_id
                    )));
                }
                let price = Money::from_cents((item.price * 100.0).round() as i64);
                Ok(LineItem::new(item.product_id, item.name, price, item.quantity))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let order = NewOrder {
            customer_id: CustomerId::new(self.customer_id),
            items,
            shipping_address: self.shipping_address,
            payment_method: self.payment_method,
        };
        if order.checked_total_amount().is_none() {
            return Err(ApiError::BadRequest("Order total is too large".to_string()));
        }
        Ok(order)
    }
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer_id: String,
    /// Dollars.
    pub total_amount: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<ItemResponse>,
    pub shipping_address: ShippingAddress,
    pub payment_info: PaymentInfoResponse,
    pub steps: Vec<StepResponse>,
}

#[derive(Serialize)]
pub struct ItemResponse {
    pub product_id: String,
    pub name: String,
    pub price: f64,
    pub quantity: u32,
}

#[derive(Serialize)]
pub struct PaymentInfoResponse {
    pub payment_method: String,
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
}

#[derive(Serialize)]
pub struct StepResponse {
    pub id: String,
    pub step_name: String,
    pub status: String,
    pub execution_order: u32,
    pub reference_id: Option<String>,
    pub error_message: Option<String>,
    pub failure_kind: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StepRecord> for StepResponse {
    fn from(step: StepRecord) -> Self {
        Self {
            id: step.id.to_string(),
            step_name: step.step_name,
            status: step.status.to_string(),
            execution_order: step.execution_order,
            reference_id: step.reference_id,
            error_message: step.error_message,
            failure_kind: step.failure_kind.map(|k| k.as_str().to_string()),
            created_at: step.created_at,
            updated_at: step.updated_at,
        }
    }
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            id: order.id.to_string(),
            customer_id: order.customer_id.to_string(),
            total_amount: order.total_amount.as_dollars(),
            status: order.status.to_string(),
            created_at: order.created_at,
            updated_at: order.updated_at,
            items: order
                .items
                .into_iter()
                .map(|item| ItemResponse {
                    product_id: item.product_id.to_string(),
                    name: item.name,
                    price: item.price.as_dollars(),
                    quantity: item.quantity,
                })
                .collect(),
            shipping_address: order.shipping_address,
            payment_info: PaymentInfoResponse {
                payment_method: order.payment_method,
                payment_id: order.payment_id,
                transaction_id: order.transaction_id,
            },
            steps: order.steps.into_iter().map(StepResponse::from).collect(),
        }
    }
}

// -- Handlers --

/// POST /orders: create an order and run the checkout saga.
///
/// Returns the order once the saga completed. If a step was rejected the
/// saga has already compensated and the step's error is returned as 400.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let new_order = req.into_new_order()?;
    let order = state.store.create_order(new_order).await?;
    tracing::info!(order_id = %order.id, total = %order.total_amount, "order created");

    saga::run_checkout(state.store.clone(), &state.services, &order).await?;

    let order = load_order(&state, order.id).await?;
    Ok(Json(order.into()))
}

/// GET /orders: list orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(State(state): State<Arc<AppState>>) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.store.list_orders().await?;
    Ok(Json(orders.into_iter().map(OrderResponse::from).collect()))
}

/// GET /orders/{id}: load an order with its step records.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = load_order(&state, order_id).await?;
    Ok(Json(order.into()))
}

async fn load_order(state: &AppState, order_id: OrderId) -> Result<Order, ApiError> {
    state
        .store
        .get_order(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Order {order_id} not found")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    id.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))
}
