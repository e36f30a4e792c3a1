//! # Bookshelf Core
//!
//! Domain types and pure business rules for the Bookshelf reading platform.
//!
//! This crate holds everything about book engagement that can be expressed
//! without I/O:
//!
//! - **Book**: the catalog record, with its running rating aggregate and comment thread
//! - **Rating Aggregator**: running-average update `(average, count, rating) → (average', count')`
//! - **Comment Ledger**: validated, timestamped, append-only comments
//! - **Fan-out events**: the values pushed to realtime subscribers of a book
//! - **Persistence and broadcast traits**: the seams the runtime injects implementations into
//!
//! ## Architecture Principles
//!
//! - Functional Core, Imperative Shell: aggregation and ledger rules are plain
//!   functions, tested against literal inputs
//! - Dependency Injection: stores, broadcasters and clocks are traits
//! - Explicit defaults: a freshly created book has `(0.0, 0)` as its aggregate,
//!   never an absent value
//!
//! ## Example
//!
//! ```
//! use bookshelf_core::rating::{Rating, RatingAggregate};
//!
//! let aggregate = RatingAggregate::default()
//!     .record(Rating::new(4).unwrap())
//!     .record(Rating::new(2).unwrap());
//!
//! assert_eq!(aggregate.rating_count, 2);
//! assert!((aggregate.average_rating - 3.0).abs() < f64::EPSILON);
//! ```

#![forbid(unsafe_code)]

pub mod book;
pub mod caller;
pub mod chapter;
pub mod comment;
pub mod error;
pub mod fanout;
pub mod library;
pub mod rating;
pub mod store;

// Re-export commonly used types
pub use book::{Book, BookId, NewBook};
pub use caller::{Caller, Role, UserId};
pub use chapter::{Chapter, ChapterDraft, ChapterId, CreatorStats, ValidDraft};
pub use chrono::{DateTime, Utc};
pub use comment::Comment;
pub use error::EngagementError;
pub use fanout::{BookEvent, BookUpdate, Broadcaster, EventStream, FanoutError};
pub use library::{Library, LibraryEntry};
pub use rating::{Rating, RatingAggregate};
pub use store::{BookStore, ChapterStore, LibraryStore, StoreError};

/// Environment module - injected dependencies that are not stores.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Comment timestamps and chapter revision times are read from a `Clock`
    /// so tests can pin them.
    ///
    /// # Examples
    ///
    /// ```
    /// use bookshelf_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
