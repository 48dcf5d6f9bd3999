//! Mock inventory service.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MockError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    pub quantity: u32,
}

/// A requested line. Extra fields such as name and price are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedItem {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct ReservationRequest {
    pub order_id: String,
    pub items: Vec<ReservedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub reservation_id: String,
    pub order_id: String,
    pub items: Vec<ReservedItem>,
    pub status: String,
}

#[derive(Debug, Default)]
struct Inner {
    products: HashMap<String, Product>,
    reservations: HashMap<String, Reservation>,
}

/// Stock levels and reservations.
#[derive(Debug, Clone, Default)]
pub struct InventoryState {
    inner: Arc<RwLock<Inner>>,
}

impl InventoryState {
    /// Catalog with product1 (100), product2 (50) and product3 (out of stock).
    pub fn seeded() -> Self {
        Self::with_products([
            ("product1", "Product 1", 100),
            ("product2", "Product 2", 50),
            ("product3", "Product 3", 0),
        ])
    }

    pub fn with_products<'a>(products: impl IntoIterator<Item = (&'a str, &'a str, u32)>) -> Self {
        let products = products
            .into_iter()
            .map(|(id, name, quantity)| {
                (
                    id.to_string(),
                    Product {
                        name: name.to_string(),
                        quantity,
                    },
                )
            })
            .collect();
        Self {
            inner: Arc::new(RwLock::new(Inner {
                products,
                reservations: HashMap::new(),
            })),
        }
    }
}

pub fn router(state: InventoryState) -> Router {
    Router::new()
        .route("/inventory/reserve", post(reserve))
        .route("/inventory/release/{reservation_id}", post(release))
        .route("/inventory/{product_id}", get(get_product))
        .with_state(state)
        .merge(crate::health_routes())
}

async fn reserve(
    State(state): State<InventoryState>,
    Json(request): Json<ReservationRequest>,
) -> Result<Json<Reservation>, MockError> {
    let mut inner = state.inner.write().await;

    for item in &request.items {
        let product = inner
            .products
            .get(&item.product_id)
            .ok_or_else(|| MockError::not_found(format!("Product {} not found", item.product_id)))?;
        if product.quantity < item.quantity {
            return Err(MockError::bad_request(format!(
                "Insufficient stock for {}. Requested: {}, Available: {}",
                item.product_id, item.quantity, product.quantity
            )));
        }
    }

    for item in &request.items {
        if let Some(product) = inner.products.get_mut(&item.product_id) {
            product.quantity -= item.quantity;
        }
    }

    let reservation = Reservation {
        reservation_id: format!("res_{}", Uuid::new_v4()),
        order_id: request.order_id,
        items: request.items,
        status: "reserved".to_string(),
    };
    tracing::info!(reservation_id = %reservation.reservation_id, "inventory reserved");
    inner
        .reservations
        .insert(reservation.reservation_id.clone(), reservation.clone());
    Ok(Json(reservation))
}

async fn release(
    State(state): State<InventoryState>,
    Path(reservation_id): Path<String>,
) -> Result<Json<Value>, MockError> {
    let mut inner = state.inner.write().await;
    let inner = &mut *inner;

    let reservation = inner
        .reservations
        .get_mut(&reservation_id)
        .ok_or_else(|| MockError::not_found("Reservation not found"))?;
    if reservation.status == "released" {
        return Err(MockError::bad_request("Reservation already released"));
    }

    for item in &reservation.items {
        if let Some(product) = inner.products.get_mut(&item.product_id) {
            product.quantity += item.quantity;
        }
    }
    reservation.status = "released".to_string();
    tracing::info!(%reservation_id, "inventory released");

    Ok(Json(json!({
        "reservation_id": reservation_id,
        "status": "released",
        "message": "Inventory released successfully",
    })))
}

async fn get_product(
    State(state): State<InventoryState>,
    Path(product_id): Path<String>,
) -> Result<Json<Value>, MockError> {
    let inner = state.inner.read().await;
    let product = inner
        .products
        .get(&product_id)
        .ok_or_else(|| MockError::not_found("Product not found"))?;
    Ok(Json(json!({
        "product_id": product_id,
        "quantity": product.quantity,
        "name": product.name,
    })))
}
