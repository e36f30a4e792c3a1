//! # Bookshelf Testing
//!
//! Testing utilities for the Bookshelf services.
//!
//! This crate provides:
//! - Deterministic clocks
//! - In-memory implementations of the persistence traits
//! - A broadcaster that records what was published
//! - Fixtures for books and callers
//!
//! ## Example
//!
//! ```
//! use bookshelf_testing::{InMemoryBookStore, fixtures};
//! use bookshelf_core::BookStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryBookStore::new();
//! let book = store.insert(fixtures::book("The Silent Library")).await?;
//! assert_eq!(book.version, 1);
//! # Ok(())
//! # }
//! ```

use bookshelf_core::environment::Clock;
use chrono::{DateTime, Utc};

pub mod broadcaster;
pub mod stores;

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use chrono::Duration;
    use std::sync::Mutex;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use bookshelf_testing::mocks::FixedClock;
    /// use bookshelf_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that advances by a fixed step on every read.
    ///
    /// Useful when a test needs distinct, ordered timestamps.
    #[derive(Debug)]
    pub struct SteppingClock {
        next: Mutex<DateTime<Utc>>,
        step: Duration,
    }

    impl SteppingClock {
        /// Start at `start`, advancing by `step` per call.
        #[must_use]
        pub const fn new(start: DateTime<Utc>, step: Duration) -> Self {
            Self {
                next: Mutex::new(start),
                step,
            }
        }
    }

    impl Clock for SteppingClock {
        #[allow(clippy::unwrap_used)] // Test infrastructure
        fn now(&self) -> DateTime<Utc> {
            let mut next = self.next.lock().unwrap();
            let now = *next;
            *next = now + self.step;
            now
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixtures for common domain values.
pub mod fixtures {
    use bookshelf_core::{Book, Caller, NewBook, Role, UserId};

    /// A fresh, unstored book with an empty aggregate.
    ///
    /// # Panics
    ///
    /// Panics if `title` is blank.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn book(title: &str) -> Book {
        Book::create(NewBook::titled(title).by("Test Author")).expect("fixture title is not blank")
    }

    /// A fresh, unstored book that already has ratings.
    ///
    /// # Panics
    ///
    /// Panics if the aggregate is inconsistent.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn rated_book(title: &str, average_rating: f64, rating_count: u64) -> Book {
        let mut entry = NewBook::titled(title).by("Test Author");
        entry.average_rating = average_rating;
        entry.rating_count = rating_count;
        Book::create(entry).expect("fixture aggregate is consistent")
    }

    /// A reader identified by email.
    #[must_use]
    pub fn reader(id: &str) -> Caller {
        Caller::new(UserId::new(id), format!("{id}@example.com"))
    }

    /// A creator identified by email.
    #[must_use]
    pub fn creator(id: &str) -> Caller {
        reader(id).with_role(Role::Creator)
    }
}

// Re-export commonly used items
pub use broadcaster::RecordingBroadcaster;
pub use mocks::{FixedClock, SteppingClock, test_clock};
pub use stores::{InMemoryBookStore, InMemoryChapterStore, InMemoryLibraryStore};
