//! Service-level error type.

use gatepass_core::error::CoreError;
use gatepass_core::types::DbId;
use gatepass_core::workflow::TransitionError;

/// Errors surfaced by [`crate::service::PermitService`].
///
/// Transient database conflicts (serialization failures, deadlocks, lock
/// timeouts) are retried inside the allocator and never reach the caller
/// directly; after the retry budget is spent they surface as
/// [`WorkflowError::AllocationExhausted`] with the permit left untouched.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A workflow precondition was violated. Caller error; never retried.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A domain-level error from `gatepass_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Permit not found: {id}")]
    NotFound { id: DbId },

    /// The allocation retry budget is spent. Retryable by a human; the
    /// permit remains pending approval.
    #[error("sequence allocation for scope '{scope}' exhausted after {attempts} attempts")]
    AllocationExhausted { scope: String, attempts: u32 },

    /// The requested duplicate repair would be unsafe or is unnecessary.
    #[error("duplicate repair rejected: {0}")]
    DuplicateRepairRejected(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for service return values.
pub type WorkflowResult<T> = Result<T, WorkflowError>;
