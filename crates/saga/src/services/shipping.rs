//! Shipping service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{LineItem, OrderId, ShippingAddress};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "shipping";

/// Postal code the shipping carrier refuses to deliver to.
pub const UNDELIVERABLE_POSTAL_CODE: &str = "00000";

/// Result of creating a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentResult {
    /// The shipment ID assigned by the shipping service.
    pub shipment_id: String,
    #[serde(default)]
    pub tracking_number: Option<String>,
    pub status: String,
    #[serde(default)]
    pub estimated_delivery: Option<String>,
}

/// Result of cancelling a shipment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancellationResult {
    pub shipment_id: String,
    pub status: String,
}

/// Trait for shipping operations.
#[async_trait]
pub trait ShippingService: Send + Sync {
    /// Books a shipment of `items` to `address`.
    async fn create_shipment(
        &self,
        order_id: OrderId,
        items: &[LineItem],
        address: &ShippingAddress,
    ) -> Result<ShipmentResult, ServiceError>;

    /// Cancels a previously booked shipment.
    async fn cancel_shipment(&self, shipment_id: &str)
    -> Result<CancellationResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryShippingState {
    /// shipment id -> (order, cancelled)
    shipments: HashMap<String, (OrderId, bool)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_cancel: bool,
    create_calls: usize,
    cancel_calls: Vec<String>,
}

/// In-memory shipping service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryShippingService {
    state: Arc<RwLock<InMemoryShippingState>>,
}

impl InMemoryShippingService {
    /// Creates a new in-memory shipping service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the service to fail every shipment creation.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Configures the service to fail every cancellation.
    pub async fn set_fail_on_cancel(&self, fail: bool) {
        self.state.write().await.fail_on_cancel = fail;
    }

    /// Returns the number of shipments not yet cancelled.
    pub async fn active_shipment_count(&self) -> usize {
        self.state
            .read()
            .await
            .shipments
            .values()
            .filter(|(_, cancelled)| !cancelled)
            .count()
    }

    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }

    /// Returns the shipment ids cancellations were requested for, in call order.
    pub async fn cancel_calls(&self) -> Vec<String> {
        self.state.read().await.cancel_calls.clone()
    }
}

#[async_trait]
impl ShippingService for InMemoryShippingService {
    async fn create_shipment(
        &self,
        order_id: OrderId,
        _items: &[LineItem],
        address: &ShippingAddress,
    ) -> Result<ShipmentResult, ServiceError> {
        let mut state = self.state.write().await;
        state.create_calls += 1;

        if state.fail_on_create {
            return Err(ServiceError::rejected(
                SERVICE,
                400,
                "Shipping carrier rejected the request",
            ));
        }
        if !address.is_complete() {
            return Err(ServiceError::rejected(
                SERVICE,
                400,
                "Invalid shipping address",
            ));
        }
        if address.postal_code == UNDELIVERABLE_POSTAL_CODE {
            return Err(ServiceError::rejected(SERVICE, 400, "Invalid postal code"));
        }

        state.next_id += 1;
        let shipment_id = format!("SHP-{:04}", state.next_id);
        let tracking_number = format!("TRK-{:06}", state.next_id);
        state.shipments.insert(shipment_id.clone(), (order_id, false));

        Ok(ShipmentResult {
            shipment_id,
            tracking_number: Some(tracking_number),
            status: "created".to_string(),
            estimated_delivery: None,
        })
    }

    async fn cancel_shipment(
        &self,
        shipment_id: &str,
    ) -> Result<CancellationResult, ServiceError> {
        let mut state = self.state.write().await;
        state.cancel_calls.push(shipment_id.to_string());

        if state.fail_on_cancel {
            return Err(ServiceError::unavailable(SERVICE, "cancellation timed out"));
        }

        let (_, cancelled) = state
            .shipments
            .get_mut(shipment_id)
            .ok_or_else(|| ServiceError::rejected(SERVICE, 404, "Shipment not found"))?;
        if *cancelled {
            return Err(ServiceError::rejected(
                SERVICE,
                400,
                "Shipment already cancelled",
            ));
        }
        *cancelled = true;

        Ok(CancellationResult {
            shipment_id: shipment_id.to_string(),
            status: "cancelled".to_string(),
        })
    }
}
