//! Caller identity attached to write operations.
//!
//! The identity provider is external: the web layer verifies a token and
//! hands a [`Caller`] to the services. Operations receive `Option<&Caller>`
//! and decide for themselves whether an absent caller is an error.

use crate::error::EngagementError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable reference to a user, as issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create a new `UserId`.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the user ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform role of a user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Reads, rates, comments and bookmarks
    #[default]
    Reader,
    /// Additionally authors chapters
    Creator,
    /// Unrestricted
    Admin,
}

impl Role {
    /// Whether this role may author chapters.
    #[must_use]
    pub const fn can_author(self) -> bool {
        matches!(self, Self::Creator | Self::Admin)
    }
}

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    /// Who is calling
    pub user_id: UserId,
    /// Name shown next to the caller's comments, captured at post time
    pub display_name: String,
    /// Platform role
    pub role: Role,
}

impl Caller {
    /// Create a reader.
    #[must_use]
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role: Role::Reader,
        }
    }

    /// Set the caller's role.
    #[must_use]
    pub const fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Fail with `Forbidden` unless the caller may author chapters.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Forbidden`] for readers.
    pub fn require_author(&self) -> Result<(), EngagementError> {
        if self.role.can_author() {
            Ok(())
        } else {
            Err(EngagementError::forbidden("Creator role required"))
        }
    }
}

/// Unwrap an optional caller, failing with `AuthenticationRequired`.
///
/// # Errors
///
/// Returns [`EngagementError::AuthenticationRequired`] when `caller` is `None`.
pub const fn authenticated(caller: Option<&Caller>) -> Result<&Caller, EngagementError> {
    match caller {
        Some(caller) => Ok(caller),
        None => Err(EngagementError::AuthenticationRequired),
    }
}
