//! Per-user reading lists.

use crate::caller::UserId;
use crate::error::EngagementError;
use serde::{Deserialize, Serialize};

/// A book saved to a reading list.
///
/// Entries are snapshots supplied by the client; they are not kept in sync
/// with the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    /// Book identifier (matched for de-duplication and removal)
    pub id: String,
    /// Title at save time
    #[serde(default)]
    pub title: String,
    /// Author at save time
    #[serde(default)]
    pub author: String,
    /// Cover reference at save time
    #[serde(default, alias = "img", skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

/// A user's reading list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Library {
    /// Owner
    pub user_id: UserId,
    /// Saved books, in insertion order
    pub books: Vec<LibraryEntry>,
    /// Optimistic concurrency version, owned by the store; 0 until first saved
    #[serde(default)]
    pub version: u64,
}

impl Library {
    /// Empty reading list for a user.
    #[must_use]
    pub const fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            books: Vec::new(),
            version: 0,
        }
    }

    /// Whether a book is already saved.
    #[must_use]
    pub fn contains(&self, book_id: &str) -> bool {
        self.books.iter().any(|entry| entry.id == book_id)
    }

    /// Save a book. Returns `false` (and changes nothing) if already present.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Validation`] when the entry has no id.
    pub fn add(&mut self, mut entry: LibraryEntry) -> Result<bool, EngagementError> {
        entry.id = entry.id.trim().to_string();
        if entry.id.is_empty() {
            return Err(EngagementError::validation("Book id is required"));
        }
        if self.contains(&entry.id) {
            return Ok(false);
        }
        self.books.push(entry);
        Ok(true)
    }

    /// Remove a book. Returns whether anything was removed.
    pub fn remove(&mut self, book_id: &str) -> bool {
        let before = self.books.len();
        self.books.retain(|entry| entry.id != book_id);
        self.books.len() != before
    }
}
