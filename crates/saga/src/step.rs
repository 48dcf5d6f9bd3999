//! Step capability contract and per-step state tracking.

use std::sync::Arc;

use async_trait::async_trait;
use order_store::{OrderId, OrderStore, StepId, StepRecord, StepStatus, StepUpdate};

use crate::context::SagaContext;
use crate::error::{Result, SagaError};

/// A unit pairing one forward remote action with its compensating action.
///
/// Implementations record their own lifecycle through their [`StepTracker`]:
/// `execute` marks the step `Completed` or `Failed` before returning, and
/// `compensate` marks it `Compensated` or `Failed` (compensation failure).
#[async_trait]
pub trait Step: Send + Sync {
    /// Tracker holding this step's registration.
    fn tracker(&self) -> &StepTracker;

    /// Mutable access used by the coordinator to register the step.
    fn tracker_mut(&mut self) -> &mut StepTracker;

    /// Step name as persisted on its record.
    fn name(&self) -> &'static str {
        self.tracker().name()
    }

    /// Context key holding the reference id `compensate` consumes, if any.
    ///
    /// Lets the coordinator restore the reference from the step record when
    /// a step aborted after its record reached `Completed`.
    fn reference_key(&self) -> Option<&'static str> {
        None
    }

    /// Performs the forward action and returns the context extended with the
    /// reference ids it produced.
    async fn execute(&self, context: SagaContext) -> Result<SagaContext>;

    /// Performs the inverse action. Never fails; a missing reference id in
    /// `context` makes this a no-op.
    async fn compensate(&self, context: SagaContext) -> SagaContext;
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    step_id: StepId,
    order_id: OrderId,
    execution_order: u32,
}

/// Records one step's lifecycle in the order store.
///
/// Every update is checked against the step state machine; disallowed
/// transitions and use before registration are contract violations.
#[derive(Clone)]
pub struct StepTracker {
    name: &'static str,
    store: Arc<dyn OrderStore>,
    registration: Option<Registration>,
}

impl StepTracker {
    pub fn new(name: &'static str, store: Arc<dyn OrderStore>) -> Self {
        Self {
            name,
            store,
            registration: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub fn is_registered(&self) -> bool {
        self.registration.is_some()
    }

    pub fn step_id(&self) -> Option<StepId> {
        self.registration.map(|r| r.step_id)
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.registration.map(|r| r.order_id)
    }

    /// 1-based position assigned at registration.
    pub fn execution_order(&self) -> Option<u32> {
        self.registration.map(|r| r.execution_order)
    }

    /// Creates this step's `Pending` record. A step registers exactly once.
    pub async fn register(&mut self, order_id: OrderId, execution_order: u32) -> Result<StepRecord> {
        if let Some(existing) = self.registration {
            return Err(SagaError::contract_violation(format!(
                "step '{}' is already registered for order {} at position {}",
                self.name, existing.order_id, existing.execution_order
            )));
        }

        let record = self
            .store
            .create_step(order_id, self.name, execution_order)
            .await?;
        self.registration = Some(Registration {
            step_id: record.id,
            order_id,
            execution_order,
        });
        tracing::debug!(step = self.name, %order_id, execution_order, "step registered");
        Ok(record)
    }

    fn registration(&self) -> Result<Registration> {
        self.registration.ok_or_else(|| {
            SagaError::contract_violation(format!("step '{}' is not registered", self.name))
        })
    }

    /// Fails with a contract violation unless the step has been registered.
    pub fn ensure_registered(&self) -> Result<()> {
        self.registration().map(|_| ())
    }

    /// Loads the current record.
    pub async fn record(&self) -> Result<StepRecord> {
        let step_id = self.registration()?.step_id;
        self.store
            .get_step(step_id)
            .await?
            .ok_or_else(|| order_store::StoreError::StepNotFound(step_id).into())
    }

    pub async fn status(&self) -> Result<StepStatus> {
        Ok(self.record().await?.status)
    }

    /// Applies `update` if the state machine allows it.
    pub async fn transition(&self, update: StepUpdate) -> Result<StepRecord> {
        let current = self.record().await?;
        if !current.status.can_transition_to(update.status) {
            return Err(SagaError::contract_violation(format!(
                "step '{}' cannot move from {} to {}",
                self.name, current.status, update.status
            )));
        }

        let record = self.store.update_step(current.id, update).await?;
        tracing::debug!(step = self.name, from = %current.status, to = %record.status, "step transitioned");
        Ok(record)
    }

    /// Applies `update` during compensation, where failures must not escape.
    pub(crate) async fn transition_logged(&self, update: StepUpdate) {
        let target = update.status;
        if let Err(e) = self.transition(update).await {
            tracing::error!(step = self.name, to = %target, error = %e, "failed to record step status");
        }
    }
}

impl std::fmt::Debug for StepTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepTracker")
            .field("name", &self.name)
            .field("registration", &self.registration)
            .finish()
    }
}
