//! In-memory persistence for fast, deterministic tests.
//!
//! - [`InMemoryBookStore`]: versioned book documents with injectable failures
//! - [`InMemoryLibraryStore`]: reading lists keyed by user
//! - [`InMemoryChapterStore`]: chapters keyed by id

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only

use bookshelf_core::store::StoreFuture;
use bookshelf_core::{
    Book, BookId, BookStore, Chapter, ChapterId, ChapterStore, Library, LibraryStore, StoreError,
    UserId,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};

#[derive(Debug, Default)]
struct BookState {
    books: HashMap<BookId, Book>,
    /// Errors returned by upcoming `save` calls, before touching state
    pending_save_failures: VecDeque<StoreError>,
    /// Error returned by every `load` while set
    load_failure: Option<StoreError>,
    saves: usize,
}

/// In-memory book store with optimistic concurrency.
///
/// Behaves like the production store: `insert` assigns version 1, `save`
/// only succeeds against the current version. Tests can queue failures to
/// exercise retry and error paths.
///
/// # Example
///
/// ```
/// use bookshelf_testing::{InMemoryBookStore, fixtures};
/// use bookshelf_core::{BookStore, StoreError};
///
/// # async fn example() -> Result<(), StoreError> {
/// let store = InMemoryBookStore::new();
/// let book = store.insert(fixtures::book("Dune")).await?;
///
/// let saved = store.save(book.clone(), 1).await?;
/// assert_eq!(saved.version, 2);
///
/// // Stale writers lose
/// assert!(store.save(book, 1).await.unwrap_err().is_conflict());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryBookStore {
    state: Arc<RwLock<BookState>>,
}

impl InMemoryBookStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` saves fail with a version conflict.
    pub fn fail_next_saves_with_conflict(&self, n: usize) {
        let mut state = self.state.write().unwrap();
        for _ in 0..n {
            state
                .pending_save_failures
                .push_back(StoreError::VersionConflict {
                    id: "injected".to_string(),
                    expected: 0,
                    actual: 0,
                });
        }
    }

    /// Make the next save fail with the given error.
    pub fn fail_next_save(&self, error: StoreError) {
        self.state
            .write()
            .unwrap()
            .pending_save_failures
            .push_back(error);
    }

    /// Make every load fail with the given error until cleared with `None`.
    pub fn fail_loads(&self, error: Option<StoreError>) {
        self.state.write().unwrap().load_failure = error;
    }

    /// Snapshot of a stored book, bypassing the trait.
    #[must_use]
    pub fn get(&self, id: BookId) -> Option<Book> {
        self.state.read().unwrap().books.get(&id).cloned()
    }

    /// Number of save attempts made so far (successful or not).
    #[must_use]
    pub fn save_attempts(&self) -> usize {
        self.state.read().unwrap().saves
    }

    /// Number of stored books
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().unwrap().books.len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().unwrap().books.is_empty()
    }
}

impl BookStore for InMemoryBookStore {
    fn load(&self, id: BookId) -> StoreFuture<'_, Option<Book>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            if let Some(err) = &state.load_failure {
                return Err(err.clone());
            }
            Ok(state.books.get(&id).cloned())
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<Book>> {
        Box::pin(async move {
            let state = self.state.read().unwrap();
            if let Some(err) = &state.load_failure {
                return Err(err.clone());
            }
            Ok(state.books.values().cloned().collect())
        })
    }

    fn insert(&self, mut book: Book) -> StoreFuture<'_, Book> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            if state.books.contains_key(&book.id) {
                return Err(StoreError::Duplicate(book.id.to_string()));
            }
            book.version = 1;
            state.books.insert(book.id, book.clone());
            Ok(book)
        })
    }

    fn save(&self, mut book: Book, expected_version: u64) -> StoreFuture<'_, Book> {
        Box::pin(async move {
            let mut state = self.state.write().unwrap();
            state.saves += 1;
            if let Some(err) = state.pending_save_failures.pop_front() {
                return Err(err);
            }

            let actual = state
                .books
                .get(&book.id)
                .map(|stored| stored.version)
                .ok_or_else(|| StoreError::Missing(book.id.to_string()))?;
            if actual != expected_version {
                return Err(StoreError::VersionConflict {
                    id: book.id.to_string(),
                    expected: expected_version,
                    actual,
                });
            }

            book.version = expected_version + 1;
            state.books.insert(book.id, book.clone());
            Ok(book)
        })
    }

    fn count(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move { Ok(self.state.read().unwrap().books.len() as u64) })
    }
}

/// In-memory reading lists keyed by user.
#[derive(Clone, Debug, Default)]
pub struct InMemoryLibraryStore {
    libraries: Arc<RwLock<HashMap<UserId, Library>>>,
}

impl InMemoryLibraryStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a user's library, bypassing the trait.
    #[must_use]
    pub fn get(&self, user_id: &UserId) -> Option<Library> {
        self.libraries.read().unwrap().get(user_id).cloned()
    }
}

impl LibraryStore for InMemoryLibraryStore {
    fn load(&self, user_id: UserId) -> StoreFuture<'_, Option<Library>> {
        Box::pin(async move { Ok(self.libraries.read().unwrap().get(&user_id).cloned()) })
    }

    fn save(&self, mut library: Library, expected_version: u64) -> StoreFuture<'_, Library> {
        Box::pin(async move {
            let mut libraries = self.libraries.write().unwrap();
            let actual = libraries.get(&library.user_id).map(|stored| stored.version);

            match actual {
                None if expected_version > 0 => {
                    return Err(StoreError::Missing(library.user_id.to_string()));
                }
                Some(actual) if actual != expected_version => {
                    return Err(StoreError::VersionConflict {
                        id: library.user_id.to_string(),
                        expected: expected_version,
                        actual,
                    });
                }
                _ => {}
            }

            library.version = expected_version + 1;
            libraries.insert(library.user_id.clone(), library.clone());
            Ok(library)
        })
    }
}

/// In-memory chapters keyed by id.
#[derive(Clone, Debug, Default)]
pub struct InMemoryChapterStore {
    chapters: Arc<RwLock<HashMap<ChapterId, Chapter>>>,
}

impl InMemoryChapterStore {
    /// Create a new empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chapters
    #[must_use]
    pub fn len(&self) -> usize {
        self.chapters.read().unwrap().len()
    }

    /// Check if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chapters.read().unwrap().is_empty()
    }
}

impl ChapterStore for InMemoryChapterStore {
    fn load(&self, id: ChapterId) -> StoreFuture<'_, Option<Chapter>> {
        Box::pin(async move { Ok(self.chapters.read().unwrap().get(&id).cloned()) })
    }

    fn save(&self, chapter: Chapter) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            self.chapters.write().unwrap().insert(chapter.id, chapter);
            Ok(())
        })
    }

    fn list_by_creator(&self, creator: UserId) -> StoreFuture<'_, Vec<Chapter>> {
        Box::pin(async move {
            Ok(self
                .chapters
                .read()
                .unwrap()
                .values()
                .filter(|chapter| chapter.creator == creator)
                .cloned()
                .collect())
        })
    }
}
