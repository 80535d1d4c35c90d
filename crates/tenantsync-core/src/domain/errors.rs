//! Domain error types
//!
//! [`DomainError`] covers validation of identifiers and keys. [`SyncError`] is
//! the taxonomy every sync operation reports at the engine boundary; the HTTP
//! adapter maps its variants onto status codes.

use thiserror::Error;

use crate::ports::object_store::StoreError;

/// Errors that can occur while validating domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Tenant id failed validation
    #[error("Invalid tenant id: {0}")]
    InvalidTenantId(String),

    /// Branch id failed validation
    #[error("Invalid branch id: {0}")]
    InvalidBranchId(String),

    /// Object key failed validation
    #[error("Invalid object key: {0}")]
    InvalidObjectKey(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

/// Errors returned by the sync orchestrator
#[derive(Debug, Error)]
pub enum SyncError {
    /// Unknown branch, or the addressed object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The key lies outside the caller's tenant namespace
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Optimistic concurrency check failed; the client should re-pull
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A push batch could not be applied; the whole batch was rolled back
    #[error("Merge failed: {0}")]
    Merge(String),

    /// The object store failed; nothing was partially persisted
    #[error("Object store error: {0}")]
    Store(#[from] StoreError),

    /// Malformed input from the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local failure while staging or opening a database file
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Stable machine-readable name of the error kind
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Conflict(_) => "conflict",
            Self::Merge(_) => "merge_error",
            Self::Store(_) => "store_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}
