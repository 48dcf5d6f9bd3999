//! Execution context threaded through one saga run.
//!
//! The context is an extensible JSON mapping. Every key a step reads or
//! writes is listed in [`keys`]; required keys are read with
//! [`SagaContext::require`], which reports a contract violation when a key is
//! missing or has the wrong shape.
//!
//! | key                | written by          | read by                      |
//! |--------------------|---------------------|------------------------------|
//! | `order_id`         | caller              | payment, inventory, shipping |
//! | `customer_id`      | caller              |                              |
//! | `total_amount`     | caller (cents)      | payment                      |
//! | `payment_method`   | caller              | payment                      |
//! | `shipping_address` | caller              | shipping                     |
//! | `items`            | caller              | inventory, shipping          |
//! | `payment_id`       | payment             | payment compensation         |
//! | `transaction_id`   | payment             |                              |
//! | `reservation_id`   | inventory           | inventory compensation       |
//! | `shipment_id`      | shipping            | shipping compensation        |
//! | `tracking_number`  | shipping            |                              |
//! | `refund_id`, `payment_status`   | payment compensation   |              |
//! | `inventory_status` | inventory compensation |                           |
//! | `shipping_status`  | shipping compensation  |                           |

use order_store::Order;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SagaError};

/// Context key names.
pub mod keys {
    pub const ORDER_ID: &str = "order_id";
    pub const CUSTOMER_ID: &str = "customer_id";
    pub const TOTAL_AMOUNT: &str = "total_amount";
    pub const PAYMENT_METHOD: &str = "payment_method";
    pub const SHIPPING_ADDRESS: &str = "shipping_address";
    pub const ITEMS: &str = "items";

    pub const PAYMENT_ID: &str = "payment_id";
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const RESERVATION_ID: &str = "reservation_id";
    pub const SHIPMENT_ID: &str = "shipment_id";
    pub const TRACKING_NUMBER: &str = "tracking_number";

    pub const REFUND_ID: &str = "refund_id";
    pub const PAYMENT_STATUS: &str = "payment_status";
    pub const INVENTORY_STATUS: &str = "inventory_status";
    pub const SHIPPING_STATUS: &str = "shipping_status";
}

/// Mutable value set accumulated over one saga run. Not persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaContext {
    values: Map<String, Value>,
}

impl SagaContext {
    /// Creates an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a context with the order fields every checkout step may read.
    pub fn for_order(order: &Order) -> Result<Self> {
        let mut context = Self::new();
        context.insert_serialized(keys::ORDER_ID, &order.id)?;
        context.insert(keys::CUSTOMER_ID, order.customer_id.as_str());
        context.insert_serialized(keys::TOTAL_AMOUNT, &order.total_amount)?;
        context.insert(keys::PAYMENT_METHOD, order.payment_method.as_str());
        context.insert_serialized(keys::SHIPPING_ADDRESS, &order.shipping_address)?;
        context.insert_serialized(keys::ITEMS, &order.items)?;
        Ok(context)
    }

    /// Sets a value, replacing any previous one.
    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Serializes and sets a value.
    pub fn insert_serialized<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.values
            .insert(key.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Returns a string value. Absent, null and empty values read as `None`.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.get(key).is_some_and(|v| !v.is_null())
    }

    /// Reads a required value, failing with a contract violation if it is
    /// missing or cannot be decoded as `T`.
    pub fn require<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .values
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| {
                SagaError::contract_violation(format!("context is missing required key '{key}'"))
            })?;

        T::deserialize(value).map_err(|e| {
            SagaError::contract_violation(format!("context key '{key}' has unexpected shape: {e}"))
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}
