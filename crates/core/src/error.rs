use crate::types::EntityId;

/// Domain error taxonomy for synchronous orchestrator operations.
///
/// Failures inside asynchronous tasks are never surfaced through this
/// type to the original caller; they arrive later as a terminal status
/// update plus a log record on the affected entity.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Entity absent, or the caller lacks access to it.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: EntityId },

    /// Malformed or missing input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The operation is invalid for the entity's current state.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A configuration reference that does not resolve to a stored config.
    #[error("Invalid configuration reference: {0}")]
    InvalidReference(String),

    /// The caller's identity is not allowed to perform this operation.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
