//! # Bookshelf Runtime
//!
//! Services that tie the pure rules of `bookshelf-core` to storage and
//! realtime delivery.
//!
//! ## Core Components
//!
//! - **`EngagementService`**: ratings, comments and catalog reads, with
//!   optimistic-concurrency retries and fan-out after each successful write
//! - **`TopicBroadcaster`**: in-process per-book publish/subscribe channels
//! - **`LibraryService`** / **`ChapterService`**: reading lists and chapter authoring
//! - **Metrics**: Prometheus counters and histograms for all of the above
//!
//! ## Example
//!
//! ```
//! use bookshelf_runtime::{EngagementService, TopicBroadcaster};
//! use bookshelf_core::environment::SystemClock;
//! use bookshelf_core::Broadcaster;
//! use bookshelf_testing::InMemoryBookStore;
//! use std::sync::Arc;
//!
//! let broadcaster = Arc::new(TopicBroadcaster::new());
//! let service = EngagementService::new(
//!     Arc::new(InMemoryBookStore::new()),
//!     Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
//!     Arc::new(SystemClock),
//! );
//! # let _ = service;
//! ```

#![forbid(unsafe_code)]

/// In-process realtime channels
pub mod broadcaster;

/// Chapter authoring
pub mod chapters;

/// Ratings, comments and catalog
pub mod engagement;

/// Reading lists
pub mod library;

/// Prometheus metrics for observability
pub mod metrics;

/// Optimistic-concurrency retry with exponential backoff
pub mod retry;

pub use broadcaster::TopicBroadcaster;
pub use chapters::ChapterService;
pub use engagement::EngagementService;
pub use library::LibraryService;
pub use retry::RetryPolicy;
