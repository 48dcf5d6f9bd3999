//! Persisted order and step record types.

use chrono::{DateTime, Utc};
use common::{CustomerId, LineItem, Money, OrderId, ShippingAddress, StepId};
use serde::{Deserialize, Serialize};

use crate::status::{FailureKind, OrderStatus, StepStatus};

/// Input for creating an order before its saga runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub customer_id: CustomerId,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
}

impl NewOrder {
    /// Returns the sum of all line totals.
    pub fn total_amount(&self) -> Money {
        self.items.iter().map(LineItem::line_total).sum()
    }

    /// Returns the sum of all line totals, or `None` if it overflows.
    pub fn checked_total_amount(&self) -> Option<Money> {
        self.items.iter().try_fold(Money::zero(), |total, item| {
            total.checked_add(item.checked_line_total()?)
        })
    }
}

/// An order together with its saga step records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: String,
    /// Set once the payment step charged the customer.
    pub payment_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Step records ordered by execution order.
    pub steps: Vec<StepRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a pending order from its creation input.
    pub fn from_new(id: OrderId, new: NewOrder) -> Self {
        let now = Utc::now();
        let total_amount = new.total_amount();
        Self {
            id,
            customer_id: new.customer_id,
            total_amount,
            status: OrderStatus::Pending,
            items: new.items,
            shipping_address: new.shipping_address,
            payment_method: new.payment_method,
            payment_id: None,
            transaction_id: None,
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the step record with the given name.
    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step_name == name)
    }
}

/// Persisted lifecycle record of one saga step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub id: StepId,
    pub order_id: OrderId,
    pub step_name: String,
    /// 1-based position in the saga, immutable after registration.
    pub execution_order: u32,
    pub status: StepStatus,
    /// Remote resource created by the forward call.
    pub reference_id: Option<String>,
    pub error_message: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StepRecord {
    /// Creates a pending record.
    pub fn pending(order_id: OrderId, step_name: impl Into<String>, execution_order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: StepId::new(),
            order_id,
            step_name: step_name.into(),
            execution_order,
            status: StepStatus::Pending,
            reference_id: None,
            error_message: None,
            failure_kind: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an update in place. Absent optional fields keep their previous value.
    pub fn apply(&mut self, update: StepUpdate) {
        self.status = update.status;
        if let Some(reference_id) = update.reference_id {
            self.reference_id = Some(reference_id);
        }
        if let Some(error_message) = update.error_message {
            self.error_message = Some(error_message);
        }
        if let Some(kind) = update.failure_kind {
            self.failure_kind = Some(kind);
        }
        self.updated_at = Utc::now();
    }
}

/// A status change for a step record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub reference_id: Option<String>,
    pub error_message: Option<String>,
    pub failure_kind: Option<FailureKind>,
}

impl StepUpdate {
    /// Forward call succeeded, producing `reference_id`.
    pub fn completed(reference_id: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Completed,
            reference_id: Some(reference_id.into()),
            error_message: None,
            failure_kind: None,
        }
    }

    /// Forward call failed.
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: StepStatus::Failed,
            reference_id: None,
            error_message: Some(error_message.into()),
            failure_kind: Some(FailureKind::Forward),
        }
    }

    /// Compensating call succeeded.
    pub fn compensated() -> Self {
        Self {
            status: StepStatus::Compensated,
            reference_id: None,
            error_message: None,
            failure_kind: None,
        }
    }

    /// Compensating call failed.
    pub fn compensation_failed(error_message: impl AsRef<str>) -> Self {
        Self {
            status: StepStatus::Failed,
            reference_id: None,
            error_message: Some(format!("Compensation failed: {}", error_message.as_ref())),
            failure_kind: Some(FailureKind::Compensation),
        }
    }
}
