//! Error types for the orchestration engine.

use crate::types::{StepId, WorkflowId, WorkflowStatus};

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced at the engine boundary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// No workflow registered under this id.
    #[error("workflow {0} not found")]
    NotFound(WorkflowId),

    /// A workflow with this id is already registered. Ids are generated by
    /// the caller-facing layer, so a collision is caller error.
    #[error("workflow {0} already exists")]
    AlreadyExists(WorkflowId),

    /// The dependency graph contains a cycle; `step_id` names one member.
    #[error("circular dependency detected involving step '{step_id}'")]
    CircularDependency { step_id: StepId },

    /// A `depends_on` entry does not resolve to a step in the same workflow.
    #[error("step '{step_id}' depends on unknown step '{dependency}'")]
    UnknownDependency { step_id: StepId, dependency: StepId },

    /// Operation attempted from an incompatible workflow status.
    #[error("workflow {id} is {actual:?}, expected {expected:?}")]
    InvalidState {
        id: WorkflowId,
        expected: WorkflowStatus,
        actual: WorkflowStatus,
    },

    /// No step can proceed although the workflow is incomplete and nothing
    /// is running. Recorded as the workflow's failure reason.
    #[error("workflow {0} deadlocked: no runnable steps remain")]
    Deadlock(WorkflowId),

    /// No workflow template registered under this name.
    #[error("template '{0}' not found")]
    TemplateNotFound(String),
}

impl EngineError {
    /// Graph problems reported synchronously from `create_workflow`.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::CircularDependency { .. } | Self::UnknownDependency { .. }
        )
    }
}

/// Failure of a single step attempt, recorded on the step.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// No executor registered for the step's type. Never retried.
    #[error("no executor registered for step type '{0}'")]
    UnknownStepType(String),

    /// An attempt exceeded the step's timeout. Counts as a failed attempt
    /// subject to the normal retry policy.
    #[error("step timed out after {0} seconds")]
    Timeout(u64),

    /// The executor returned an error.
    #[error(transparent)]
    Execution(#[from] anyhow::Error),
}

impl StepError {
    /// Whether further attempts can change the outcome.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::UnknownStepType(_))
    }
}
