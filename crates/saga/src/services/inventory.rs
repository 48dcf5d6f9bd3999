//! Inventory service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{LineItem, OrderId, ProductId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "inventory";

/// Result of a successful inventory reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationResult {
    /// The reservation ID assigned by the inventory service.
    pub reservation_id: String,
    pub status: String,
}

/// Result of releasing a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseResult {
    pub reservation_id: String,
    pub status: String,
}

/// Trait for inventory management operations.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Reserves stock for all order items, or nothing.
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> Result<ReservationResult, ServiceError>;

    /// Releases a previously made reservation.
    async fn release(&self, reservation_id: &str) -> Result<ReleaseResult, ServiceError>;
}

#[derive(Debug)]
struct Reservation {
    #[allow(dead_code)]
    order_id: OrderId,
    items: Vec<(ProductId, u32)>,
    released: bool,
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    /// `None` means unlimited stock for every product.
    stock: Option<HashMap<ProductId, u32>>,
    reservations: HashMap<String, Reservation>,
    next_id: u32,
    fail_on_reserve: bool,
    fail_on_release: bool,
    reserve_calls: usize,
    release_calls: Vec<String>,
}

/// In-memory inventory service for testing.
///
/// Stock is unlimited until [`set_stock`](Self::set_stock) is called; from
/// then on unknown products and short stock are rejected like the mock
/// inventory service does.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the available quantity of a product and enables stock tracking.
    pub async fn set_stock(&self, product_id: impl Into<ProductId>, quantity: u32) {
        self.state
            .write()
            .await
            .stock
            .get_or_insert_with(HashMap::new)
            .insert(product_id.into(), quantity);
    }

    /// Returns the available quantity of a tracked product.
    pub async fn stock_of(&self, product_id: &str) -> Option<u32> {
        self.state
            .read()
            .await
            .stock
            .as_ref()
            .and_then(|s| s.get(&ProductId::new(product_id)).copied())
    }

    /// Configures the service to fail every reserve call.
    pub async fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().await.fail_on_reserve = fail;
    }

    /// Configures the service to fail every release call.
    pub async fn set_fail_on_release(&self, fail: bool) {
        self.state.write().await.fail_on_release = fail;
    }

    /// Returns the number of reservations not yet released.
    pub async fn active_reservation_count(&self) -> usize {
        self.state
            .read()
            .await
            .reservations
            .values()
            .filter(|r| !r.released)
            .count()
    }

    pub async fn reserve_calls(&self) -> usize {
        self.state.read().await.reserve_calls
    }

    /// Returns the reservation ids releases were requested for, in call order.
    pub async fn release_calls(&self) -> Vec<String> {
        self.state.read().await.release_calls.clone()
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn reserve(
        &self,
        order_id: OrderId,
        items: &[LineItem],
    ) -> Result<ReservationResult, ServiceError> {
        let mut state = self.state.write().await;
        state.reserve_calls += 1;

        if state.fail_on_reserve {
            return Err(ServiceError::rejected(SERVICE, 400, "Insufficient stock"));
        }

        if let Some(stock) = state.stock.as_mut() {
            for item in items {
                let available = stock.get(&item.product_id).copied().ok_or_else(|| {
                    ServiceError::rejected(
                        SERVICE,
                        404,
                        format!("Product {} not found", item.product_id),
                    )
                })?;
                if available < item.quantity {
                    return Err(ServiceError::rejected(
                        SERVICE,
                        400,
                        format!(
                            "Insufficient stock for {}. Requested: {}, Available: {}",
                            item.product_id, item.quantity, available
                        ),
                    ));
                }
            }
            for item in items {
                if let Some(available) = stock.get_mut(&item.product_id) {
                    *available -= item.quantity;
                }
            }
        }

        state.next_id += 1;
        let reservation_id = format!("RES-{:04}", state.next_id);
        state.reservations.insert(
            reservation_id.clone(),
            Reservation {
                order_id,
                items: items
                    .iter()
                    .map(|i| (i.product_id.clone(), i.quantity))
                    .collect(),
                released: false,
            },
        );

        Ok(ReservationResult {
            reservation_id,
            status: "reserved".to_string(),
        })
    }

    async fn release(&self, reservation_id: &str) -> Result<ReleaseResult, ServiceError> {
        let mut state = self.state.write().await;
        state.release_calls.push(reservation_id.to_string());

        if state.fail_on_release {
            return Err(ServiceError::unavailable(SERVICE, "release timed out"));
        }

        let state = &mut *state;
        let reservation = state
            .reservations
            .get_mut(reservation_id)
            .ok_or_else(|| ServiceError::rejected(SERVICE, 404, "Reservation not found"))?;
        if reservation.released {
            return Err(ServiceError::rejected(
                SERVICE,
                400,
                "Reservation already released",
            ));
        }
        reservation.released = true;

        if let Some(stock) = state.stock.as_mut() {
            for (product_id, quantity) in &reservation.items {
                *stock.entry(product_id.clone()).or_insert(0) += quantity;
            }
        }

        Ok(ReleaseResult {
            reservation_id: reservation_id.to_string(),
            status: "released".to_string(),
        })
    }
}
