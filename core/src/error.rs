//! Error taxonomy for engagement operations.
//!
//! Every failure reported to a caller is one of the variants of
//! [`EngagementError`]. The web layer maps each variant to a status code and
//! a stable error code; nothing else about the failure leaks to clients.

use crate::store::StoreError;
use std::fmt;
use thiserror::Error;

/// Errors returned by the engagement, library and chapter operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngagementError {
    /// Caller-supplied data failed a precondition.
    ///
    /// Never retried and never logged as a system fault.
    #[error("{0}")]
    Validation(String),

    /// The operation needs a caller identity that was absent or unverifiable.
    #[error("Authentication required")]
    AuthenticationRequired,

    /// The caller is known but lacks the role or ownership the operation needs.
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// The referenced record does not exist (or its identifier is malformed).
    #[error("{resource} with id {id} not found")]
    NotFound {
        /// Kind of record that was looked up
        resource: &'static str,
        /// Identifier as supplied by the caller
        id: String,
    },

    /// The underlying store could not complete a load or save.
    #[error("Persistence failure: {0}")]
    Persistence(String),
}

impl EngagementError {
    /// Create a validation error with a human-readable message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a forbidden error with a human-readable message.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    /// Create a not-found error for the given resource kind and identifier.
    #[must_use]
    pub fn not_found(resource: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    /// Name of the taxonomy member, as reported to callers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::AuthenticationRequired => "AuthenticationRequired",
            Self::Forbidden(_) => "Forbidden",
            Self::NotFound { .. } => "NotFound",
            Self::Persistence(_) => "PersistenceFailure",
        }
    }

    /// Whether this error is a fault of the system rather than of the caller.
    #[must_use]
    pub const fn is_system_fault(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<StoreError> for EngagementError {
    fn from(err: StoreError) -> Self {
        Self::Persistence(err.to_string())
    }
}
