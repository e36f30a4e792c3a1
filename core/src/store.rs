//! Persistence traits for books, libraries and chapters.
//!
//! The services never talk to a database directly; they are handed trait
//! objects (`Arc<dyn BookStore>`) so production can use `PostgreSQL` and tests
//! can use in-memory maps.
//!
//! # Optimistic Concurrency
//!
//! Books carry a `version`. [`BookStore::save`] only succeeds when the stored
//! version still equals `expected_version`; otherwise it returns
//! [`StoreError::VersionConflict`] and the caller reloads and retries. This is
//! what keeps two concurrent ratings from overwriting each other's update.
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` rather than using `async fn` so the
//! traits can be used as `Arc<dyn BookStore>`.

use crate::book::{Book, BookId};
use crate::caller::UserId;
use crate::chapter::{Chapter, ChapterId};
use crate::library::Library;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Boxed future returned by store methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Conditional write lost a race with another writer.
    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        /// Record that was being written
        id: String,
        /// Version the writer read
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Conditional write targeted a record that no longer exists.
    #[error("Record not found: {0}")]
    Missing(String),

    /// Insert collided with an existing record.
    #[error("Record already exists: {0}")]
    Duplicate(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    Database(String),

    /// Stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Whether retrying against fresh state may succeed.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }
}

/// Storage for book documents.
pub trait BookStore: Send + Sync {
    /// Load a book by id, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable or the document is corrupt.
    fn load(&self, id: BookId) -> StoreFuture<'_, Option<Book>>;

    /// Load every book in the catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable.
    fn list(&self) -> StoreFuture<'_, Vec<Book>>;

    /// Insert a new book. The stored copy (returned) has version 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`] if the id is taken.
    fn insert(&self, book: Book) -> StoreFuture<'_, Book>;

    /// Replace a book if its stored version equals `expected_version`.
    ///
    /// The returned copy carries the bumped version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`]: another writer saved first
    /// - [`StoreError::Missing`]: the book was deleted in the meantime
    fn save(&self, book: Book, expected_version: u64) -> StoreFuture<'_, Book>;

    /// Number of books in the catalog.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable.
    fn count(&self) -> StoreFuture<'_, u64>;
}

/// Storage for per-user reading lists.
pub trait LibraryStore: Send + Sync {
    /// Load a user's library, or `None` if they never saved one.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable.
    fn load(&self, user_id: UserId) -> StoreFuture<'_, Option<Library>>;

    /// Write a user's library if its stored version equals `expected_version`.
    ///
    /// An `expected_version` of 0 creates the library and conflicts if one
    /// already exists. The returned copy carries the bumped version.
    ///
    /// # Errors
    ///
    /// - [`StoreError::VersionConflict`]: another writer saved first
    /// - [`StoreError::Missing`]: the library was deleted in the meantime
    fn save(&self, library: Library, expected_version: u64) -> StoreFuture<'_, Library>;
}

/// Storage for creator-authored chapters.
pub trait ChapterStore: Send + Sync {
    /// Load a chapter by id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable.
    fn load(&self, id: ChapterId) -> StoreFuture<'_, Option<Chapter>>;

    /// Create or replace a chapter.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable.
    fn save(&self, chapter: Chapter) -> StoreFuture<'_, ()>;

    /// All chapters written by a creator, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store is unreachable.
    fn list_by_creator(&self, creator: UserId) -> StoreFuture<'_, Vec<Chapter>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_version_conflicts_are_retryable() {
        let conflict = StoreError::VersionConflict {
            id: "b1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_conflict());
        assert!(!StoreError::Database("down".to_string()).is_conflict());
        assert!(!StoreError::Missing("b1".to_string()).is_conflict());
    }

    #[test]
    fn conflict_display() {
        let conflict = StoreError::VersionConflict {
            id: "b1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert_eq!(
            conflict.to_string(),
            "Version conflict on b1: expected 1, found 2"
        );
    }
}
