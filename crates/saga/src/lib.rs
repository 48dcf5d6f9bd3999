//! Saga pattern implementation for checkout.
//!
//! This crate coordinates a multi-step transaction across independent
//! remote services with compensating actions on failure.
//!
//! The checkout saga follows these steps:
//! 1. Process payment
//! 2. Reserve inventory
//! 3. Create shipment
//!
//! If any step fails, the steps that completed are compensated in reverse
//! order and the original failure is returned once compensation finishes.
//! A compensation failure is recorded on its step and never stops the sweep.

pub mod checkout;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod services;
pub mod step;
pub mod steps;

pub use checkout::{CheckoutServices, checkout_saga, run_checkout};
pub use context::{SagaContext, keys};
pub use coordinator::{SagaBuilder, SagaCoordinator};
pub use error::{SagaError, ServiceError};
pub use services::{
    HttpInventoryService, HttpPaymentService, HttpShippingService, InMemoryInventoryService,
    InMemoryPaymentService, InMemoryShippingService, InventoryService, PaymentService,
    ShippingService,
};
pub use step::{Step, StepTracker};
pub use steps::{InventoryStep, PaymentStep, ShippingStep};
