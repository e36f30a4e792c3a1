//! Personal reading lists.
//!
//! Adds and removes reload the library and save conditionally on the loaded
//! version, so two concurrent edits by the same user cannot drop each
//! other's change.

use crate::retry::{AttemptError, RetryPolicy, retry_on_conflict};
use bookshelf_core::caller::authenticated;
use bookshelf_core::{Caller, EngagementError, Library, LibraryEntry, LibraryStore, StoreError};
use std::sync::Arc;
use tracing::{debug, info};

/// Reading-list operations for authenticated callers.
#[derive(Clone)]
pub struct LibraryService {
    libraries: Arc<dyn LibraryStore>,
    retry: RetryPolicy,
}

impl LibraryService {
    /// Create a service over the given store, with the default retry policy.
    #[must_use]
    pub fn new(libraries: Arc<dyn LibraryStore>) -> Self {
        Self {
            libraries,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for conflicting writes.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The caller's library, or an empty one if they never saved a book.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn get(&self, caller: Option<&Caller>) -> Result<Library, EngagementError> {
        let caller = authenticated(caller)?;
        Ok(self.load_or_empty(caller).await?)
    }

    /// Save a book to the caller's library. Already-saved books are left as is.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Validation`]: entry without an id
    /// - [`EngagementError::Persistence`]: store failure, or retries exhausted
    pub async fn add(
        &self,
        caller: Option<&Caller>,
        entry: LibraryEntry,
    ) -> Result<Library, EngagementError> {
        let caller = authenticated(caller)?;
        retry_on_conflict(&self.retry, "library_add", |attempt| {
            self.add_once(caller, entry.clone(), attempt)
        })
        .await
    }

    /// Remove a book from the caller's library.
    ///
    /// Removing a book that is not in an existing library is a no-op.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::NotFound`]: the caller has no library yet
    /// - [`EngagementError::Persistence`]: store failure, or retries exhausted
    pub async fn remove(
        &self,
        caller: Option<&Caller>,
        book_id: &str,
    ) -> Result<Library, EngagementError> {
        let caller = authenticated(caller)?;
        retry_on_conflict(&self.retry, "library_remove", |attempt| {
            self.remove_once(caller, book_id, attempt)
        })
        .await
    }

    async fn load_or_empty(&self, caller: &Caller) -> Result<Library, StoreError> {
        Ok(self
            .libraries
            .load(caller.user_id.clone())
            .await?
            .unwrap_or_else(|| Library::empty(caller.user_id.clone())))
    }

    async fn add_once(
        &self,
        caller: &Caller,
        entry: LibraryEntry,
        attempt: usize,
    ) -> Result<Library, AttemptError> {
        let mut library = self.load_or_empty(caller).await?;
        let expected = library.version;
        let book_id = entry.id.clone();

        if !library.add(entry)? {
            debug!(user_id = %caller.user_id, book_id = %book_id, "Book already in library");
            return Ok(library);
        }

        let saved = self.libraries.save(library, expected).await?;
        info!(user_id = %caller.user_id, book_id = %book_id, attempt, "Book added to library");
        Ok(saved)
    }

    async fn remove_once(
        &self,
        caller: &Caller,
        book_id: &str,
        attempt: usize,
    ) -> Result<Library, AttemptError> {
        let mut library = self
            .libraries
            .load(caller.user_id.clone())
            .await?
            .ok_or_else(|| EngagementError::not_found("Library", &caller.user_id))?;
        let expected = library.version;

        if !library.remove(book_id) {
            return Ok(library);
        }

        let saved = self.libraries.save(library, expected).await?;
        info!(user_id = %caller.user_id, book_id, attempt, "Book removed from library");
        Ok(saved)
    }
}
