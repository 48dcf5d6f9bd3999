use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, OrderId};
use order_store::{OrderStore, StepUpdate};

use crate::checkout::STEP_PAYMENT;
use crate::context::{SagaContext, keys};
use crate::error::Result;
use crate::services::PaymentService;
use crate::step::{Step, StepTracker};

/// Charges the order total; compensation refunds the charge.
///
/// Reads `order_id`, `total_amount` and `payment_method`; produces
/// `payment_id` and `transaction_id`.
#[derive(Clone)]
pub struct PaymentStep {
    tracker: StepTracker,
    service: Arc<dyn PaymentService>,
}

impl PaymentStep {
    pub fn new(store: Arc<dyn OrderStore>, service: Arc<dyn PaymentService>) -> Self {
        Self {
            tracker: StepTracker::new(STEP_PAYMENT, store),
            service,
        }
    }
}

#[async_trait]
impl Step for PaymentStep {
    fn tracker(&self) -> &StepTracker {
        &self.tracker
    }

    fn tracker_mut(&mut self) -> &mut StepTracker {
        &mut self.tracker
    }

    fn reference_key(&self) -> Option<&'static str> {
        Some(keys::PAYMENT_ID)
    }

    async fn execute(&self, mut context: SagaContext) -> Result<SagaContext> {
        self.tracker.ensure_registered()?;
        let order_id: OrderId = context.require(keys::ORDER_ID)?;
        let amount: Money = context.require(keys::TOTAL_AMOUNT)?;
        let payment_method: String = context.require(keys::PAYMENT_METHOD)?;

        tracing::info!(%order_id, %amount, "executing payment step");

        let payment = match self
            .service
            .process_payment(order_id, amount, &payment_method)
            .await
        {
            Ok(payment) => payment,
            Err(e) => return Err(super::fail_forward(&self.tracker, e).await),
        };

        if let Err(e) = self
            .tracker
            .transition(StepUpdate::completed(&payment.payment_id))
            .await
        {
            let undo = self.service.refund_payment(&payment.payment_id);
            return Err(super::abandon_completed(&self.tracker, e, undo).await);
        }
        // Payment info on the order is informational; the step record holds
        // the reference compensation relies on.
        if let Err(e) = self
            .tracker
            .store()
            .record_payment(order_id, &payment.payment_id, &payment.transaction_id)
            .await
        {
            tracing::error!(%order_id, payment_id = %payment.payment_id, error = %e, "failed to store payment info");
        }

        context.insert(keys::PAYMENT_ID, payment.payment_id);
        context.insert(keys::TRANSACTION_ID, payment.transaction_id);
        Ok(context)
    }

    async fn compensate(&self, mut context: SagaContext) -> SagaContext {
        let Some(payment_id) = context.get_str(keys::PAYMENT_ID).map(str::to_string) else {
            tracing::warn!("no payment to refund");
            return context;
        };

        tracing::info!(%payment_id, "compensating payment step");

        match self.service.refund_payment(&payment_id).await {
            Ok(refund) => {
                self.tracker
                    .transition_logged(StepUpdate::compensated())
                    .await;
                context.insert(keys::REFUND_ID, refund.refund_id);
                context.insert(keys::PAYMENT_STATUS, "refunded");
            }
            Err(e) => super::fail_compensation(&self.tracker, e).await,
        }
        context
    }
}
