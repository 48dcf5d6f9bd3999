//! Remote service clients consumed by the checkout steps.
//!
//! Each domain has a trait, an in-memory implementation for tests, and an
//! HTTP implementation in [`http`].

pub mod http;
pub mod inventory;
pub mod payment;
pub mod shipping;

pub use http::{HttpInventoryService, HttpPaymentService, HttpShippingService};
pub use inventory::{InMemoryInventoryService, InventoryService, ReleaseResult, ReservationResult};
pub use payment::{InMemoryPaymentService, PaymentResult, PaymentService, RefundResult};
pub use shipping::{CancellationResult, InMemoryShippingService, ShipmentResult, ShippingService};
