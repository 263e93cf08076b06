//! Top-level error taxonomy for the edit pipeline.

use crate::llm::{BackendError, RotationError};
use crate::lock::LockError;
use crate::patch::PatchError;
use crate::store::StoreError;
use crate::vcs::GatewayError;
use uuid::Uuid;

/// Failures surfaced by the edit orchestrator.
///
/// Stage-local failures with a defined fallback (provider rotation,
/// swarm-to-single fallback) are recovered inside the stages and never
/// appear here; these are the conditions that reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum EditError {
    /// The invocation carried no verified caller identity
    #[error("a verified caller identity is required")]
    Unauthorized,

    /// Another edit holds the self-edit lock; surfaced immediately, never
    /// retried automatically
    #[error("another edit is already in flight")]
    LockBusy,

    /// The generation reply contained no recognized patch delimiters
    #[error("generated reply is not a valid patch: {0}")]
    InvalidPatchFormat(String),

    /// Patch application left the source unchanged; the pending edit is
    /// retained so apply can be retried without re-planning
    #[error("patch application produced no changes")]
    NoChangesProduced,

    /// The safety validator reported at least one error
    #[error("safety validation failed: {}", errors.join("; "))]
    ValidationFailed {
        errors: Vec<String>,
        warnings: Vec<String>,
    },

    /// No live pending edit exists under the given id (never created, already
    /// applied, or expired)
    #[error("no pending edit with id {0}")]
    PendingEditNotFound(Uuid),

    #[error(transparent)]
    Rotation(RotationError),

    /// A direct backend call failed after the swarm fallback was exhausted
    #[error(transparent)]
    Backend(BackendError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("lock subsystem failure: {0}")]
    Lock(LockError),
}

impl From<RotationError> for EditError {
    fn from(error: RotationError) -> Self {
        EditError::Rotation(error)
    }
}

impl From<BackendError> for EditError {
    fn from(error: BackendError) -> Self {
        EditError::Backend(error)
    }
}

impl From<LockError> for EditError {
    fn from(error: LockError) -> Self {
        match error {
            LockError::Busy(_) => EditError::LockBusy,
            other => EditError::Lock(other),
        }
    }
}

impl From<PatchError> for EditError {
    fn from(error: PatchError) -> Self {
        EditError::InvalidPatchFormat(error.to_string())
    }
}
