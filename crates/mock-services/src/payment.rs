//! Mock payment service.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::MockError;

/// Charges above this amount are declined.
pub const CHARGE_LIMIT: f64 = 1000.0;

#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    pub order_id: String,
    pub amount: f64,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub payment_id: String,
    pub order_id: String,
    pub amount: f64,
    pub payment_method: String,
    pub status: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Refund {
    pub refund_id: String,
    pub payment_id: String,
    pub amount: f64,
    pub status: String,
}

/// Payments and refunds by id.
#[derive(Debug, Clone, Default)]
pub struct PaymentState {
    payments: Arc<RwLock<HashMap<String, Payment>>>,
    refunds: Arc<RwLock<HashMap<String, Refund>>>,
}

pub fn router(state: PaymentState) -> Router {
    Router::new()
        .route("/payments", post(process_payment))
        .route("/payments/{payment_id}", get(get_payment))
        .route("/payments/{payment_id}/refund", post(refund_payment))
        .with_state(state)
        .merge(crate::health_routes())
}

async fn process_payment(
    State(state): State<PaymentState>,
    Json(request): Json<PaymentRequest>,
) -> Result<Json<Payment>, MockError> {
    if request.amount <= 0.0 {
        return Err(MockError::bad_request("Invalid amount"));
    }
    if request.amount > CHARGE_LIMIT {
        return Err(MockError::bad_request("Insufficient funds"));
    }

    let payment = Payment {
        payment_id: format!("pay_{}", Uuid::new_v4()),
        order_id: request.order_id,
        amount: request.amount,
        payment_method: request.payment_method,
        status: "completed".to_string(),
        transaction_id: format!("trx_{}", Uuid::new_v4()),
    };
    tracing::info!(payment_id = %payment.payment_id, amount = payment.amount, "payment processed");

    state
        .payments
        .write()
        .await
        .insert(payment.payment_id.clone(), payment.clone());
    Ok(Json(payment))
}

async fn refund_payment(
    State(state): State<PaymentState>,
    Path(payment_id): Path<String>,
) -> Result<Json<Refund>, MockError> {
    let mut payments = state.payments.write().await;
    let payment = payments
        .get_mut(&payment_id)
        .ok_or_else(|| MockError::not_found("Payment not found"))?;
    if payment.status == "refunded" {
        return Err(MockError::bad_request("Payment already refunded"));
    }

    let refund = Refund {
        refund_id: format!("ref_{}", Uuid::new_v4()),
        payment_id: payment_id.clone(),
        amount: payment.amount,
        status: "completed".to_string(),
    };
    payment.status = "refunded".to_string();
    tracing::info!(%payment_id, refund_id = %refund.refund_id, "payment refunded");

    state
        .refunds
        .write()
        .await
        .insert(refund.refund_id.clone(), refund.clone());
    Ok(Json(refund))
}

async fn get_payment(
    State(state): State<PaymentState>,
    Path(payment_id): Path<String>,
) -> Result<Json<Payment>, MockError> {
    state
        .payments
        .read()
        .await
        .get(&payment_id)
        .cloned()
        .map(Json)
        .ok_or_else(|| MockError::not_found("Payment not found"))
}
