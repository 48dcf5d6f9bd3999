//! Concrete checkout steps.
//!
//! The three steps share one contract and differ only in the context keys
//! they read, the remote operations they call and the reference id they
//! produce for their own compensation.

mod inventory;
mod payment;
mod shipping;

pub use inventory::InventoryStep;
pub use payment::PaymentStep;
pub use shipping::ShippingStep;

use std::future::Future;

use order_store::StepUpdate;

use crate::error::{SagaError, ServiceError};
use crate::step::StepTracker;

/// Records a forward failure and converts it into the error that aborts the saga.
async fn fail_forward(tracker: &StepTracker, error: ServiceError) -> SagaError {
    tracing::error!(step = tracker.name(), error = %error, "saga step failed");
    if let Err(e) = tracker
        .transition(StepUpdate::failed(error.to_string()))
        .await
    {
        tracing::error!(step = tracker.name(), error = %e, "failed to record step failure");
    }
    SagaError::step_execution(tracker.name(), error)
}

/// Records a compensation failure. The error is logged and swallowed.
async fn fail_compensation(tracker: &StepTracker, error: ServiceError) {
    let message = error.to_string();
    let error = SagaError::compensation(tracker.name(), error);
    tracing::error!(step = tracker.name(), error = %error, "compensation failed");
    tracker
        .transition_logged(StepUpdate::compensation_failed(message))
        .await;
}

/// Handles a store failure that hit after the remote call succeeded.
///
/// The remote effect is undone through `undo` and the step is recorded as
/// failed, so no completed work is left behind that the sweep would not see.
async fn abandon_completed<T>(
    tracker: &StepTracker,
    error: SagaError,
    undo: impl Future<Output = Result<T, ServiceError>>,
) -> SagaError {
    tracing::error!(
        step = tracker.name(),
        error = %error,
        "failed to record step completion, undoing remote effect"
    );
    if let Err(e) = undo.await {
        tracing::error!(step = tracker.name(), error = %e, "undo of unrecorded step failed");
    }
    tracker
        .transition_logged(StepUpdate::failed(error.to_string()))
        .await;
    error
}
