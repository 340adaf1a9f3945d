//! Service-level errors and the result categories they map to.

use crate::catalog::ValidationError;
use crate::entity_store::{EntityKind, StoreError};
use crate::mirror::MirrorError;
use thiserror::Error;

/// Failure categories exposed to callers of the core operations. Success is
/// the `Ok` side of [`ServiceResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCategory {
    InvalidInput,
    ReferenceNotFound,
    NotFound,
    DuplicateFavorite,
    InvalidCategory,
    Forbidden,
    PartialFailure,
    Conflict,
    Unauthorized,
    Internal,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Referenced {kind} '{id}' not found")]
    ReferenceNotFound { kind: EntityKind, id: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("Item is already a favorite")]
    DuplicateFavorite,

    #[error("Invalid favorite category '{0}'")]
    InvalidCategory(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The record was written but at least one mirror could not be updated.
    /// `reconcile(kind, id)` repairs it.
    #[error("{kind} '{id}' was stored but its mirrors are stale: {source}")]
    PartialFailure {
        kind: EntityKind,
        id: String,
        #[source]
        source: MirrorError,
    },

    #[error("{kind} '{id}' still has {dependents} dependent record(s)")]
    HasDependents {
        kind: EntityKind,
        id: String,
        dependents: usize,
    },

    #[error("A user with email '{0}' already exists")]
    DuplicateEmail(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl From<ValidationError> for ServiceError {
    fn from(err: ValidationError) -> Self {
        ServiceError::InvalidInput(err.to_string())
    }
}

impl ServiceError {
    pub fn category(&self) -> ResultCategory {
        match self {
            ServiceError::InvalidInput(_) | ServiceError::HasDependents { .. } => {
                ResultCategory::InvalidInput
            }
            ServiceError::ReferenceNotFound { .. } => ResultCategory::ReferenceNotFound,
            ServiceError::NotFound { .. } => ResultCategory::NotFound,
            ServiceError::DuplicateFavorite => ResultCategory::DuplicateFavorite,
            ServiceError::InvalidCategory(_) => ResultCategory::InvalidCategory,
            ServiceError::Forbidden(_) => ResultCategory::Forbidden,
            ServiceError::PartialFailure { .. } => ResultCategory::PartialFailure,
            ServiceError::DuplicateEmail(_) => ResultCategory::Conflict,
            ServiceError::InvalidCredentials => ResultCategory::Unauthorized,
            ServiceError::Mirror(_) | ServiceError::Store(_) | ServiceError::Internal(_) => {
                ResultCategory::Internal
            }
        }
    }

    /// Only a partial failure can be retried, via reconcile.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::PartialFailure { .. })
    }

    pub(crate) fn not_found(kind: EntityKind, id: &str) -> Self {
        ServiceError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn reference_not_found(kind: EntityKind, id: &str) -> Self {
        ServiceError::ReferenceNotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub(crate) fn partial(kind: EntityKind, id: &str, source: MirrorError) -> Self {
        ServiceError::PartialFailure {
            kind,
            id: id.to_string(),
            source,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
