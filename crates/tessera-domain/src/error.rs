//! Domain error types for authorization operations.

use thiserror::Error;

use crate::condition::ConditionError;

/// Domain-specific errors for authorization operations.
///
/// Authorization *decisions* are boolean outputs and never surface as
/// errors: a missing relation config, an exceeded depth bound, a detected
/// cycle or a broken conditional tuple all contribute `false` to the
/// decision. The variants below cover the remaining cases — invalid writes,
/// malformed requests, storage failures and cancellation.
#[derive(Debug, Error)]
pub enum DomainError {
    /// No relation config exists for `(object_type, relation)`.
    ///
    /// Raised on writes only; during a check a missing config denies.
    #[error("relation config not found: {object_type}#{relation}")]
    RelationConfigNotFound {
        object_type: String,
        relation: String,
    },

    /// The tuple's subject type is not assignable to the relation.
    #[error("subject type '{subject_type}' not assignable to {object_type}#{relation} (allowed: {allowed:?})")]
    InvalidSubjectType {
        object_type: String,
        relation: String,
        subject_type: String,
        /// The relation's `directly_assignable_types`, for the caller.
        allowed: Vec<String>,
    },

    /// The relation does not accept userset subjects.
    #[error("userset subjects not allowed on {object_type}#{relation}")]
    UsersetNotAllowed {
        object_type: String,
        relation: String,
    },

    /// Structurally malformed request or tuple (empty fields, oversized
    /// fields, wildcard with a subject relation).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    /// Storage operation failed during resolution or a write.
    #[error("storage operation failed: {reason}")]
    StorageOperationFailed { reason: String },

    /// The caller's cancellation signal fired mid-operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Condition definition rejected at write time.
    #[error(transparent)]
    Condition(#[from] ConditionError),
}

impl DomainError {
    pub(crate) fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
