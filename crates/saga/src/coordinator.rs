//! Saga coordinator for orchestrating multi-step sagas.

use std::sync::Arc;

use order_store::{OrderId, OrderStatus, OrderStore, StepStatus, StepUpdate};

use crate::context::SagaContext;
use crate::error::{Result, SagaError};
use crate::step::Step;

/// Drives one order's steps forward and, on failure, compensates the steps
/// that completed in reverse order.
///
/// Steps run strictly one at a time. A forward failure is returned to the
/// caller only after the compensation sweep has finished.
pub struct SagaCoordinator {
    store: Arc<dyn OrderStore>,
    order_id: OrderId,
    steps: Vec<Box<dyn Step>>,
}

impl SagaCoordinator {
    /// Binds `steps` to an order and registers each one as `Pending` at
    /// positions 1..=N in the given order.
    pub async fn new(
        store: Arc<dyn OrderStore>,
        order_id: OrderId,
        mut steps: Vec<Box<dyn Step>>,
    ) -> Result<Self> {
        if store.get_order(order_id).await?.is_none() {
            return Err(order_store::StoreError::OrderNotFound(order_id).into());
        }

        for (position, step) in (1u32..).zip(steps.iter_mut()) {
            step.tracker_mut().register(order_id, position).await?;
        }

        Ok(Self {
            store,
            order_id,
            steps,
        })
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Registered steps in execution order.
    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    /// Runs every step in order.
    ///
    /// On success the order is `Completed` and the accumulated context is
    /// returned. On the first failure the order is marked `Failed`, the steps
    /// completed so far are compensated, and the original error is returned.
    #[tracing::instrument(skip(self, context), fields(order_id = %self.order_id, steps = self.steps.len()))]
    pub async fn execute(&self, context: SagaContext) -> Result<SagaContext> {
        metrics::counter!("saga_executions_total").increment(1);
        let saga_start = std::time::Instant::now();

        self.store
            .update_order_status(self.order_id, OrderStatus::Processing)
            .await?;

        let mut context = context;
        let mut failure = None;

        for (index, step) in self.steps.iter().enumerate() {
            tracing::info!(step = step.name(), "saga step started");
            match step.execute(context.clone()).await {
                Ok(next) => {
                    context = next;
                    tracing::info!(step = step.name(), "saga step completed");
                }
                Err(e) => {
                    metrics::counter!("saga_step_failures_total", "step" => step.name())
                        .increment(1);
                    self.ensure_failed(&**step, &e).await;
                    failure = Some((index, e));
                    break;
                }
            }
        }

        let Some((aborted, error)) = failure else {
            self.store
                .update_order_status(self.order_id, OrderStatus::Completed)
                .await?;
            metrics::counter!("saga_completed").increment(1);
            metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
            tracing::info!("saga completed successfully");
            return Ok(context);
        };

        tracing::error!(error = %error, "saga failed, compensating completed steps");
        if let Err(e) = self
            .store
            .update_order_status(self.order_id, OrderStatus::Failed)
            .await
        {
            tracing::error!(error = %e, "failed to mark order failed");
        }

        let mut to_compensate: Vec<&dyn Step> =
            self.steps[..aborted].iter().map(|step| &**step).collect();
        let aborted_step = &*self.steps[aborted];
        if self.restore_completed(aborted_step, &mut context).await {
            to_compensate.push(aborted_step);
        }
        self.compensate_steps(context, to_compensate).await;

        metrics::counter!("saga_failed").increment(1);
        metrics::histogram!("saga_duration_seconds").record(saga_start.elapsed().as_secs_f64());
        Err(error)
    }

    /// Compensates `steps` in reverse execution order.
    ///
    /// Never fails: each step records its own compensation outcome and the
    /// sweep always continues to the next step.
    pub async fn compensate(&self, context: SagaContext, steps: &[Box<dyn Step>]) -> SagaContext {
        self.compensate_steps(context, steps.iter().map(|step| &**step).collect())
            .await
    }

    async fn compensate_steps(
        &self,
        mut context: SagaContext,
        mut steps: Vec<&dyn Step>,
    ) -> SagaContext {
        steps.sort_by_key(|step| std::cmp::Reverse(step.tracker().execution_order()));

        for step in steps {
            tracing::info!(step = step.name(), "compensating step");
            let before = step.tracker().status().await.ok();
            let reference_missing = step
                .reference_key()
                .is_some_and(|key| !context.contains(key));
            context = step.compensate(context).await;

            let outcome = match step.tracker().status().await {
                Ok(after) => compensation_outcome(before, after, reference_missing),
                Err(e) => {
                    tracing::error!(step = step.name(), error = %e, "failed to read step status");
                    "unknown"
                }
            };
            match outcome {
                "missing_reference" => tracing::error!(
                    step = step.name(),
                    "completed step has no reference in the context, left uncompensated"
                ),
                "unrecorded" => tracing::error!(
                    step = step.name(),
                    "compensation outcome was not recorded, step is still completed"
                ),
                _ => {}
            }
            metrics::counter!(
                "saga_compensations_total",
                "step" => step.name(),
                "outcome" => outcome
            )
            .increment(1);
        }

        context
    }

    /// Returns true if `step` aborted the forward pass but its record already
    /// reached `Completed`. Its recorded reference id is put back into the
    /// context so its compensation can find it.
    async fn restore_completed(&self, step: &dyn Step, context: &mut SagaContext) -> bool {
        let record = match step.tracker().record().await {
            Ok(record) if record.status == StepStatus::Completed => record,
            Ok(_) => return false,
            Err(e) => {
                tracing::error!(step = step.name(), error = %e, "failed to read aborted step");
                return false;
            }
        };

        tracing::warn!(step = step.name(), "aborted step left a completed record, compensating it");
        if let (Some(key), Some(reference)) = (step.reference_key(), record.reference_id) {
            if !context.contains(key) {
                context.insert(key, reference);
            }
        }
        true
    }

    /// Compensates every registered step; steps that never completed are no-ops.
    pub async fn compensate_all(&self, context: SagaContext) -> SagaContext {
        self.compensate(context, &self.steps).await
    }

    /// Makes sure a step that aborted the forward pass is recorded as failed,
    /// even when it stopped before reaching its service (e.g. a missing
    /// context key).
    async fn ensure_failed(&self, step: &dyn Step, error: &SagaError) {
        match step.tracker().status().await {
            Ok(StepStatus::Pending) => {
                step.tracker()
                    .transition_logged(StepUpdate::failed(error.to_string()))
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(step = step.name(), error = %e, "failed to read step status");
            }
        }
    }
}

/// Classifies one compensation by the step status before and after it.
fn compensation_outcome(
    before: Option<StepStatus>,
    after: StepStatus,
    reference_missing: bool,
) -> &'static str {
    match (before, after) {
        (_, StepStatus::Compensated) => "compensated",
        (Some(StepStatus::Completed), StepStatus::Failed) => "failed",
        (Some(StepStatus::Completed), StepStatus::Completed) if reference_missing => {
            "missing_reference"
        }
        (Some(StepStatus::Completed), StepStatus::Completed) => "unrecorded",
        _ => "skipped",
    }
}

impl std::fmt::Debug for SagaCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SagaCoordinator")
            .field("order_id", &self.order_id)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Collects steps and binds them to an order.
pub struct SagaBuilder {
    store: Arc<dyn OrderStore>,
    steps: Vec<Box<dyn Step>>,
}

impl SagaBuilder {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            steps: Vec::new(),
        }
    }

    /// Appends a step; steps execute in the order they are added.
    pub fn step(mut self, step: impl Step + 'static) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    pub fn boxed_step(mut self, step: Box<dyn Step>) -> Self {
        self.steps.push(step);
        self
    }

    /// Registers the collected steps against `order_id`.
    pub async fn build(self, order_id: OrderId) -> Result<SagaCoordinator> {
        SagaCoordinator::new(self.store, order_id, self.steps).await
    }
}
