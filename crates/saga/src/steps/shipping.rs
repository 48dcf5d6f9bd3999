use std::sync::Arc;

use async_trait::async_trait;
use common::{LineItem, OrderId, ShippingAddress};
use order_store::{OrderStore, StepUpdate};

use crate::checkout::STEP_SHIPPING;
use crate::context::{SagaContext, keys};
use crate::error::Result;
use crate::services::ShippingService;
use crate::step::{Step, StepTracker};

/// Books the shipment; compensation cancels it.
#[derive(Clone)]
pub struct ShippingStep {
    tracker: StepTracker,
    service: Arc<dyn ShippingService>,
}

impl ShippingStep {
    pub fn new(store: Arc<dyn OrderStore>, service: Arc<dyn ShippingService>) -> Self {
        Self {
            tracker: StepTracker::new(STEP_SHIPPING, store),
            service,
        }
    }
}

#[async_trait]
impl Step for ShippingStep {
    fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut StepTracker {
        &mut self.tracker
    }

    fn reference_key(&self) -> Option<&'static str> {
        Some(keys::SHIPMENT_ID)
    }

    async fn execute(&self, mut context: SagaContext) -> Result<SagaContext> {
        self.tracker.ensure_registered()?;
        let order_id: OrderId = context.require(keys::ORDER_ID)?;
        let items: Vec<LineItem> = context.require(keys::ITEMS)?;
        let address: ShippingAddress = context.require(keys::SHIPPING_ADDRESS)?;

        tracing::info!(%order_id, "executing shipping step");

        let shipment = match self
            .service
            .create_shipment(order_id, &items, &address)
            .await
        {
            Ok(shipment) => shipment,
            Err(e) => return Err(super::fail_forward(&self.tracker, e).await),
        };

        if let Err(e) = self
            .tracker
            .transition(StepUpdate::completed(&shipment.shipment_id))
            .await
        {
            let undo = self.service.cancel_shipment(&shipment.shipment_id);
            return Err(super::abandon_completed(&self.tracker, e, undo).await);
        }
        context.insert(keys::SHIPMENT_ID, shipment.shipment_id);
        context.insert(keys::TRACKING_NUMBER, shipment.tracking_number);
        Ok(context)
    }

    async fn compensate(&self, mut context: SagaContext) -> SagaContext {
        let Some(shipment_id) = context.get_str(keys::SHIPMENT_ID).map(str::to_string) else {
            tracing::warn!("no shipment to cancel");
            return context;
        };

        tracing::info!(%shipment_id, "compensating shipping step");

        match self.service.cancel_shipment(&shipment_id).await {
            Ok(_) => {
                self.tracker
                    .transition_logged(StepUpdate::compensated())
                    .await;
                context.insert(keys::SHIPPING_STATUS, "cancelled");
            }
            Err(e) => super::fail_compensation(&self.tracker, e).await,
        }
        context
    }
}
