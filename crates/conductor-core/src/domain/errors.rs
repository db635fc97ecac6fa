use thiserror::Error;

use super::ids::TaskId;

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors the engine surfaces to callers.
///
/// Task-level failures are not errors: they are recovered locally (retried or
/// terminalized) and reported through the event bus. Only invalid input and
/// invalid configuration reach this enum.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("duplicate task id: {0}")]
    DuplicateTask(TaskId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
