use std::sync::Arc;

use async_trait::async_trait;
use common::{LineItem, OrderId};
use order_store::{OrderStore, StepUpdate};

use crate::checkout::STEP_INVENTORY;
use crate::context::{SagaContext, keys};
use crate::error::Result;
use crate::services::InventoryService;
use crate::step::{Step, StepTracker};

/// Reserves stock for the order items; compensation releases the reservation.
#[derive(Clone)]
pub struct InventoryStep {
    tracker: StepTracker,
    service: Arc<dyn InventoryService>,
}

impl InventoryStep {
    pub fn new(store: Arc<dyn OrderStore>, service: Arc<dyn InventoryService>) -> Self {
        Self {
            tracker: StepTracker::new(STEP_INVENTORY, store),
            service,
        }
    }
}

#[async_trait]
impl Step for InventoryStep {
    fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut StepTracker {
        &mut self.tracker
    }

    fn reference_key(&self) -> Option<&'static str> {
        Some(keys::RESERVATION_ID)
    }

    async fn execute(&self, mut context: SagaContext) -> Result<SagaContext> {
        self.tracker.ensure_registered()?;
        let order_id: OrderId = context.require(keys::ORDER_ID)?;
        let items: Vec<LineItem> = context.require(keys::ITEMS)?;

        tracing::info!(%order_id, items = items.len(), "executing inventory step");

        let reservation = match self.service.reserve(order_id, &items).await {
            Ok(reservation) => reservation,
            Err(e) => return Err(super::fail_forward(&self.tracker, e).await),
        };

        if let Err(e) = self
            .tracker
            .transition(StepUpdate::completed(&reservation.reservation_id))
            .await
        {
            let undo = self.service.release(&reservation.reservation_id);
            return Err(super::abandon_completed(&self.tracker, e, undo).await);
        }
        context.insert(keys::RESERVATION_ID, reservation.reservation_id);
        Ok(context)
    }

    async fn compensate(&self, mut context: SagaContext) -> SagaContext {
        let Some(reservation_id) = context.get_str(keys::RESERVATION_ID).map(str::to_string)
        else {
            tracing::warn!("no inventory reservation to release");
            return context;
        };

        tracing::info!(%reservation_id, "compensating inventory step");

        match self.service.release(&reservation_id).await {
            Ok(_) => {
                self.tracker
                    .transition_logged(StepUpdate::compensated())
                    .await;
                context.insert(keys::INVENTORY_STATUS, "released");
            }
            Err(e) => super::fail_compensation(&self.tracker, e).await,
        }
        context
    }
}
