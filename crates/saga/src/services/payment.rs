//! Payment service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "payment";

/// Result of a successful payment charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    /// The payment ID assigned by the payment service.
    pub payment_id: String,
    pub transaction_id: String,
    pub status: String,
}

/// Result of a successful refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund_id: String,
    pub status: String,
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentService: Send + Sync {
    /// Charges the order total.
    async fn process_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        payment_method: &str,
    ) -> Result<PaymentResult, ServiceError>;

    /// Refunds a previously made payment.
    async fn refund_payment(&self, payment_id: &str) -> Result<RefundResult, ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    /// payment id -> (order, amount, refunded)
    payments: HashMap<String, (OrderId, Money, bool)>,
    next_id: u32,
    charge_limit: Option<Money>,
    fail_on_charge: bool,
    fail_on_refund: bool,
    charge_calls: usize,
    refund_calls: Vec<String>,
}

/// In-memory payment service for testing.
///
/// Mirrors the mock payment service: non-positive amounts and amounts above
/// the charge limit are rejected.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentService {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentService {
    /// Creates a new in-memory payment service with no charge limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects charges above `limit` with "Insufficient funds".
    pub async fn set_charge_limit(&self, limit: Money) {
        self.state.write().await.charge_limit = Some(limit);
    }

    /// Configures the service to fail every charge call.
    pub async fn set_fail_on_charge(&self, fail: bool) {
        self.state.write().await.fail_on_charge = fail;
    }

    /// Configures the service to fail every refund call.
    pub async fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().await.fail_on_refund = fail;
    }

    /// Returns the number of payments not yet refunded.
    pub async fn active_payment_count(&self) -> usize {
        self.state
            .read()
            .await
            .payments
            .values()
            .filter(|(_, _, refunded)| !refunded)
            .count()
    }

    /// Returns how many times a charge was attempted.
    pub async fn charge_calls(&self) -> usize {
        self.state.read().await.charge_calls
    }

    /// Returns the payment ids refunds were requested for, in call order.
    pub async fn refund_calls(&self) -> Vec<String> {
        self.state.read().await.refund_calls.clone()
    }
}

#[async_trait]
impl PaymentService for InMemoryPaymentService {
    async fn process_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        _payment_method: &str,
    ) -> Result<PaymentResult, ServiceError> {
        let mut state = self.state.write().await;
        state.charge_calls += 1;

        if state.fail_on_charge {
            return Err(ServiceError::rejected(SERVICE, 402, "Payment declined"));
        }
        if amount <= Money::zero() {
            return Err(ServiceError::rejected(SERVICE, 400, "Invalid amount"));
        }
        if state.charge_limit.is_some_and(|limit| amount > limit) {
            return Err(ServiceError::rejected(SERVICE, 400, "Insufficient funds"));
        }

        state.next_id += 1;
        let payment_id = format!("PAY-{:04}", state.next_id);
        let transaction_id = format!("TRX-{:04}", state.next_id);
        state
            .payments
            .insert(payment_id.clone(), (order_id, amount, false));

        Ok(PaymentResult {
            payment_id,
            transaction_id,
            status: "completed".to_string(),
        })
    }

    async fn refund_payment(&self, payment_id: &str) -> Result<RefundResult, ServiceError> {
        let mut state = self.state.write().await;
        state.refund_calls.push(payment_id.to_string());

        if state.fail_on_refund {
            return Err(ServiceError::unavailable(SERVICE, "refund timed out"));
        }

        let refund_number = state.refund_calls.len();
        let (_, _, refunded) = state
            .payments
            .get_mut(payment_id)
            .ok_or_else(|| ServiceError::rejected(SERVICE, 404, "Payment not found"))?;
        if *refunded {
            return Err(ServiceError::rejected(SERVICE, 400, "Payment already refunded"));
        }
        *refunded = true;

        Ok(RefundResult {
            refund_id: format!("REF-{refund_number:04}"),
            status: "completed".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_charge_and_refund() {
        let service = InMemoryPaymentService::new();
        let result = service
            .process_payment(OrderId::new(), Money::from_cents(5000), "credit_card")
            .await
            .unwrap();
        assert!(result.payment_id.starts_with("PAY-"));
        assert!(result.transaction_id.starts_with("TRX-"));
        assert_eq!(service.active_payment_count().await, 1);

        let refund = service.refund_payment(&result.payment_id).await.unwrap();
        assert_eq!(refund.status, "completed");
        assert_eq!(service.active_payment_count().await, 0);
        assert_eq!(service.refund_calls().await, vec![result.payment_id]);
    }

    #[tokio::test]
    async fn test_charge_limit() {
        let service = InMemoryPaymentService::new();
        service.set_charge_limit(Money::from_dollars(1000)).await;

        let err = service
            .process_payment(OrderId::new(), Money::from_dollars(1500), "credit_card")
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "Insufficient funds");
        assert_eq!(service.charge_calls().await, 1);
        assert_eq!(service.active_payment_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_amount() {
        let service = InMemoryPaymentService::new();
        let err = service
            .process_payment(OrderId::new(), Money::zero(), "credit_card")
            .await
            .unwrap_err();
        assert_eq!(err.message, "Invalid amount");
    }

    #[tokio::test]
    async fn test_refund_twice_rejected() {
        let service = InMemoryPaymentService::new();
        let result = service
            .process_payment(OrderId::new(), Money::from_cents(100), "credit_card")
            .await
            .unwrap();

        service.refund_payment(&result.payment_id).await.unwrap();
        let err = service
            .refund_payment(&result.payment_id)
            .await
            .unwrap_err();
        assert_eq!(err.message, "Payment already refunded");
    }

    #[tokio::test]
    async fn test_refund_unknown_payment() {
        let service = InMemoryPaymentService::new();
        let err = service.refund_payment("PAY-9999").await.unwrap_err();
        assert_eq!(err.status, 404);
    }

    #[tokio::test]
    async fn test_sequential_payment_ids() {
        let service = InMemoryPaymentService::new();
        let order_id = OrderId::new();
        let amount = Money::from_cents(1000);

        let r1 = service
            .process_payment(order_id, amount, "card")
            .await
            .unwrap();
        let r2 = service
            .process_payment(order_id, amount, "card")
            .await
            .unwrap();

        assert_eq!(r1.payment_id, "PAY-0001");
        assert_eq!(r2.payment_id, "PAY-0002");
    }
}
