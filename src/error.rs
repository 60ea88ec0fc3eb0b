use crate::model::TaskId;
use thiserror::Error;

/// Typed engine error kinds, per the failure taxonomy the router and retry
/// logic dispatch on. Kept separate from `anyhow::Error`, which is reserved
/// for the CLI boundary and I/O glue that never needs to be matched on.
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("parse error: {0}")]
    ParseError(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("task {task_id}: unresolved reference {reference}")]
    UnresolvedReference { task_id: TaskId, reference: String },

    #[error("task {task_id}: timed out after {timeout_secs}s")]
    Timeout { task_id: TaskId, timeout_secs: u64 },

    #[error("task {task_id}: condition evaluated to failure")]
    ConditionFailed { task_id: TaskId },

    #[error("task {task_id}: transport error: {message}")]
    TransportError { task_id: TaskId, message: String },

    #[error("routing loop detected after {hops} hops starting at task {start}")]
    RoutingLoop { start: TaskId, hops: usize },

    #[error("task {task_id} canceled")]
    Canceled { task_id: TaskId },
}

impl EngineError {
    /// Whether this failure kind is eligible for the leaf retry loop (§4.2 /
    /// §7). `UnresolvedReference`, `RoutingLoop` and `Canceled` are not.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            EngineError::Timeout { .. }
                | EngineError::ConditionFailed { .. }
                | EngineError::TransportError { .. }
        )
    }

    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            EngineError::UnresolvedReference { task_id, .. }
            | EngineError::Timeout { task_id, .. }
            | EngineError::ConditionFailed { task_id }
            | EngineError::TransportError { task_id, .. }
            | EngineError::Canceled { task_id } => Some(*task_id),
            _ => None,
        }
    }
}

/// Mirrors the `EngineError` variants without their payloads; stored on a
/// `TaskResult` so the driver can compute the final exit code (§6) without
/// re-parsing error strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UnresolvedReference,
    Timeout,
    ConditionFailed,
    TransportError,
    Canceled,
}

impl From<&EngineError> for Option<ErrorKind> {
    fn from(e: &EngineError) -> Self {
        match e {
            EngineError::UnresolvedReference { .. } => Some(ErrorKind::UnresolvedReference),
            EngineError::Timeout { .. } => Some(ErrorKind::Timeout),
            EngineError::ConditionFailed { .. } => Some(ErrorKind::ConditionFailed),
            EngineError::TransportError { .. } => Some(ErrorKind::TransportError),
            EngineError::Canceled { .. } => Some(ErrorKind::Canceled),
            _ => None,
        }
    }
}
