//! Mock shipping service.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MockError;

const ADDRESS_FIELDS: [&str; 5] = ["street", "city", "state", "postal_code", "country"];

/// Postal code the carrier does not deliver to.
pub const UNDELIVERABLE_POSTAL_CODE: &str = "00000";

/// Days between booking and the estimated delivery date.
const DELIVERY_DAYS: i64 = 5;

#[derive(Debug, Deserialize)]
pub struct ShipmentRequest {
    pub order_id: String,
    #[serde(default)]
    pub items: Vec<Value>,
    pub address: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipment {
    pub shipment_id: String,
    pub order_id: String,
    pub items: Vec<Value>,
    pub address: Map<String, Value>,
    pub tracking_number: Option<String>,
    pub status: String,
    pub estimated_delivery: Option<String>,
}

/// Shipments by id.
#[derive(Debug, Clone, Default)]
pub struct ShippingState {
    shipments: Arc<RwLock<HashMap<String, Shipment>>>,
}

pub fn router(state: ShippingState) -> Router {
    Router::new()
        .route("/shipments", post(create_shipment))
        .route("/shipments/{shipment_id}", get(get_shipment))
        .route("/shipments/{shipment_id}/cancel", post(cancel_shipment))
        .with_state(state)
        .merge(crate::health_routes())
}

fn address_field<'a>(address: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    address
        .get(field)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
}

async fn create_shipment(
    State(state): State<ShippingState>,
    Json(request): Json<ShipmentRequest>,
) -> Result<Json<Shipment>, MockError> {
    if ADDRESS_FIELDS
        .iter()
        .any(|field| address_field(&request.address, field).is_none())
    {
        return Err(MockError::bad_request("Invalid shipping address"));
    }
    if address_field(&request.address, "postal_code") == Some(UNDELIVERABLE_POSTAL_CODE) {
        return Err(MockError::bad_request("Invalid postal code"));
    }

    let tracking = Uuid::new_v4().simple().to_string()[..12].to_uppercase();
    let estimated_delivery =
        (chrono::Utc::now() + chrono::Duration::days(DELIVERY_DAYS)).format("%Y-%m-%d");

    let shipment = Shipment {
        shipment_id: format!("ship_{}", Uuid::new_v4()),
        order_id: request.order_id,
        items: request.items,
        address: request.address,
        tracking_number: Some(format!("TRK{tracking}")),
        status: "scheduled".to_string(),
        estimated_delivery: Some(estimated_delivery.to_string()),
    };
    tracing::info!(shipment_id = %shipment.shipment_id, "shipment scheduled");

    state
        .shipments
        .write()
        .await
        .insert(shipment.shipment_id.clone(), shipment.clone());
    Ok(Json(shipment))
}

async fn cancel_shipment(
    State(state): State<ShippingState>,
    Path(shipment_id): Path<String>,
) -> Result<Json<Value>, MockError> {
    let mut shipments = state.shipments.write().await;
    let shipment = shipments
        .get_mut(&shipment_id)
        .ok_or_else(|| MockError::not_found("Shipment not found"))?;

    match shipment.status.as_str() {
        "cancelled" => return Err(MockError::bad_request("Shipment already cancelled")),
        "shipped" => return Err(MockError::bad_request("Cannot cancel shipped shipment")),
        _ => {}
    }
    shipment.status = "cancelled".to_string();
    tracing::info!(%shipment_id, "shipment cancelled");

    Ok(Json(json!({
        "shipment_id": shipment_id,
        "status": "cancelled",
        "message": "Shipment cancelled successfully",
    })))
}

async fn get_shipment(
    State(state): State<ShippingState>,
    Path(shipment_id): Path<String>,
) -> Result<Json<Shipment>, MockError> {
    state
        .shipments
        .read()
        .await
        .get(&shipment_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| MockError::not_found("Shipment not found"))
}
