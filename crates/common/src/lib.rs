//! Shared value types used across the checkout saga crates.

pub mod money;
pub mod types;

pub use money::Money;
pub use types::{CustomerId, LineItem, OrderId, ProductId, ShippingAddress, StepId};
