//! Order and step status state machines.

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Aggregate status of an order.
///
/// ```text
/// Pending ──► Processing ──┬──► Completed
///                          └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Order created, saga not started.
    #[default]
    Pending,
    /// Saga is running.
    Processing,
    /// Every step completed (terminal state).
    Completed,
    /// A step failed on its forward call (terminal state).
    Failed,
}

impl OrderStatus {
    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Failed)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Processing => "processing",
            OrderStatus::Completed => "completed",
            OrderStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "processing" => Ok(OrderStatus::Processing),
            "completed" => Ok(OrderStatus::Completed),
            "failed" => Ok(OrderStatus::Failed),
            other => Err(StoreError::InvalidData(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

/// Lifecycle status of a single saga step.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Completed ──┬──► Compensated
///           │                └──► Failed (compensation)
///           └──► Failed (forward)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Registered, forward call not yet made.
    #[default]
    Pending,
    /// Forward call succeeded; awaiting saga success or compensation.
    Completed,
    /// Forward or compensating call failed (terminal state).
    Failed,
    /// Compensating call succeeded (terminal state).
    Compensated,
}

impl StepStatus {
    /// Returns true if the step may move to `next`.
    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Completed)
                | (StepStatus::Pending, StepStatus::Failed)
                | (StepStatus::Completed, StepStatus::Compensated)
                | (StepStatus::Completed, StepStatus::Failed)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Failed | StepStatus::Compensated)
    }

    /// Returns the status name as stored.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Compensated => "compensated",
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StepStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "compensated" => Ok(StepStatus::Compensated),
            other => Err(StoreError::InvalidData(format!(
                "unknown step status '{other}'"
            ))),
        }
    }
}

/// Which direction of a step failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    /// The forward call was rejected or could not be made.
    Forward,
    /// The compensating call failed after a successful forward call.
    Compensation,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Forward => "forward",
            FailureKind::Compensation => "compensation",
        }
    }
}

impl std::str::FromStr for FailureKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward" => Ok(FailureKind::Forward),
            "compensation" => Ok(FailureKind::Compensation),
            other => Err(StoreError::InvalidData(format!(
                "unknown failure kind '{other}'"
            ))),
        }
    }
}
