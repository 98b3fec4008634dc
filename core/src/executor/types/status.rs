use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of one stage inside a run.
///
/// `Pending → Ready → Running → {Succeeded, Failed, Cancelled}`; undispatched
/// stages may also go straight to `Failed` (dependency failed) or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid stage transition from {from:?} to {to:?}")]
pub struct TransitionError {
    pub from: StageStatus,
    pub to: StageStatus,
}

impl StageStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn can_transition_to(self, to: StageStatus) -> bool {
        use StageStatus::*;
        match (self, to) {
            (Pending, Ready) => true,
            (Ready, Running) => true,
            (Running, Succeeded) | (Running, Failed) | (Running, Cancelled) => true,
            // never dispatched
            (Pending, Failed) | (Pending, Cancelled) => true,
            (Ready, Failed) | (Ready, Cancelled) => true,
            _ => false,
        }
    }

    pub fn transition(self, to: StageStatus) -> Result<StageStatus, TransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(TransitionError { from: self, to })
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a stage did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The stage ran and returned an error.
    ExecutionFailed(String),
    /// A (transitive) dependency failed; the stage was never dispatched.
    DependencyFailed(String),
    /// Cancelled while running, or never dispatched because of cancellation.
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecutionFailed(msg) => write!(f, "execution failed: {msg}"),
            Self::DependencyFailed(dep) => write!(f, "dependency failed: {dep}"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}
