use thiserror::Error;

/// Errors raised while turning a merged stage tree into an execution graph.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate stage ID: {0}")]
    DuplicateStageId(String),

    #[error("Unresolved dependency: stage '{stage}' depends on '{missing}'")]
    UnresolvedDependency { stage: String, missing: String },

    #[error("Cyclic dependency detected: {}", .0.join(" -> "))]
    CyclicDependency(Vec<String>),
}

impl GraphError {
    /// Stage ids named by this error, in the order they are reported.
    pub fn stage_ids(&self) -> Vec<&str> {
        match self {
            Self::DuplicateStageId(id) => vec![id.as_str()],
            Self::UnresolvedDependency { stage, missing } => vec![stage.as_str(), missing.as_str()],
            Self::CyclicDependency(cycle) => cycle.iter().map(String::as_str).collect(),
        }
    }
}

/// Errors local to a single stage execution.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    #[error("query client error: {0}")]
    Client(String),

    #[error("cancelled")]
    Cancelled,
}

impl StageError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
