//! The checkout saga: payment, then inventory, then shipping.

use std::sync::Arc;

use order_store::{Order, OrderId, OrderStore};

use crate::context::SagaContext;
use crate::coordinator::{SagaBuilder, SagaCoordinator};
use crate::error::Result;
use crate::services::{InventoryService, PaymentService, ShippingService};
use crate::steps::{InventoryStep, PaymentStep, ShippingStep};

/// Step name: charge the order total.
pub const STEP_PAYMENT: &str = "payment";

/// Step name: reserve stock for the order items.
pub const STEP_INVENTORY: &str = "inventory";

/// Step name: book the shipment.
pub const STEP_SHIPPING: &str = "shipping";

/// Checkout step names in execution order.
pub const CHECKOUT_STEPS: [&str; 3] = [STEP_PAYMENT, STEP_INVENTORY, STEP_SHIPPING];

/// Remote services the checkout steps call.
#[derive(Clone)]
pub struct CheckoutServices {
    pub payment: Arc<dyn PaymentService>,
    pub inventory: Arc<dyn InventoryService>,
    pub shipping: Arc<dyn ShippingService>,
}

impl CheckoutServices {
    pub fn new(
        payment: Arc<dyn PaymentService>,
        inventory: Arc<dyn InventoryService>,
        shipping: Arc<dyn ShippingService>,
    ) -> Self {
        Self {
            payment,
            inventory,
            shipping,
        }
    }
}

impl std::fmt::Debug for CheckoutServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutServices").finish_non_exhaustive()
    }
}

/// Builds the checkout saga for an existing order and registers its steps.
pub async fn checkout_saga(
    store: Arc<dyn OrderStore>,
    services: &CheckoutServices,
    order_id: OrderId,
) -> Result<SagaCoordinator> {
    SagaBuilder::new(store.clone())
        .step(PaymentStep::new(store.clone(), services.payment.clone()))
        .step(InventoryStep::new(store.clone(), services.inventory.clone()))
        .step(ShippingStep::new(store, services.shipping.clone()))
        .build(order_id)
        .await
}

/// Runs the checkout saga for `order` with a context seeded from it.
#[tracing::instrument(skip_all, fields(order_id = %order.id))]
pub async fn run_checkout(
    store: Arc<dyn OrderStore>,
    services: &CheckoutServices,
    order: &Order,
) -> Result<SagaContext> {
    let context = SagaContext::for_order(order)?;
    let saga = checkout_saga(store, services, order.id).await?;
    saga.execute(context).await
}
