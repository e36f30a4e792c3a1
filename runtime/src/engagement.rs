//! Engagement service: ratings, comments and catalog reads.
//!
//! Write operations follow the same shape:
//!
//! 1. Check the caller and validate input (no I/O)
//! 2. Load the book, apply the pure rule, save conditionally on the loaded
//!    version; on a version conflict, go back to the load
//! 3. Publish the persisted result to the book's realtime channel
//!
//! A failed write never publishes. A failed publish never fails the write.

use crate::metrics::{EngagementMetrics, FanoutMetrics, StoreMetrics};
use crate::retry::{AttemptError, RetryPolicy, retry_on_conflict};
use bookshelf_core::caller::authenticated;
use bookshelf_core::environment::Clock;
use bookshelf_core::{
    Book, BookEvent, BookId, BookStore, Broadcaster, Caller, Comment, EngagementError, NewBook,
    Rating, RatingAggregate, StoreError, comment,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Ratings, comments and catalog access for books.
///
/// All collaborators are injected, so the service runs unchanged against
/// `PostgreSQL` in production and in-memory doubles in tests.
///
/// # Example
///
/// ```
/// use bookshelf_runtime::{EngagementService, TopicBroadcaster};
/// use bookshelf_core::environment::SystemClock;
/// use bookshelf_core::{BookStore, Caller, UserId};
/// use bookshelf_testing::{InMemoryBookStore, fixtures};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let books = Arc::new(InMemoryBookStore::new());
/// let book = books.insert(fixtures::book("Dune")).await?;
///
/// let service = EngagementService::new(
///     books,
///     Arc::new(TopicBroadcaster::new()),
///     Arc::new(SystemClock),
/// );
///
/// let caller = Caller::new(UserId::new("u1"), "alice");
/// let aggregate = service
///     .submit_rating(&book.id.to_string(), &json!(4), Some(&caller))
///     .await?;
/// assert_eq!(aggregate.rating_count, 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EngagementService {
    books: Arc<dyn BookStore>,
    broadcaster: Arc<dyn Broadcaster>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl EngagementService {
    /// Create a service with the default retry policy.
    #[must_use]
    pub fn new(
        books: Arc<dyn BookStore>,
        broadcaster: Arc<dyn Broadcaster>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            books,
            broadcaster,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used for conflicting writes.
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The broadcaster events are published on.
    #[must_use]
    pub fn broadcaster(&self) -> Arc<dyn Broadcaster> {
        Arc::clone(&self.broadcaster)
    }

    /// Fold a rating into a book's aggregate and publish the new aggregate.
    ///
    /// `raw_rating` may be a JSON number or numeric string; it must be an
    /// integer in `1..=5`.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Validation`]: rating not coercible to `1..=5`
    /// - [`EngagementError::NotFound`]: unknown or malformed book id
    /// - [`EngagementError::Persistence`]: store failure or retries exhausted
    pub async fn submit_rating(
        &self,
        book_id: &str,
        raw_rating: &serde_json::Value,
        caller: Option<&Caller>,
    ) -> Result<RatingAggregate, EngagementError> {
        let result = self.rate(book_id, raw_rating, caller).await;
        observe("submit_rating", book_id, &result);
        result
    }

    async fn rate(
        &self,
        book_id: &str,
        raw_rating: &serde_json::Value,
        caller: Option<&Caller>,
    ) -> Result<RatingAggregate, EngagementError> {
        let caller = authenticated(caller)?;
        let rating = Rating::coerce(raw_rating)?;
        let id = BookId::parse(book_id)?;

        let saved = retry_on_conflict(&self.retry, "submit_rating", |attempt| {
            self.rate_once(id, rating, attempt)
        })
        .await?;

        let aggregate = saved.rating();
        EngagementMetrics::record_rating();
        info!(
            book_id = %id,
            user_id = %caller.user_id,
            rating = rating.value(),
            average_rating = aggregate.average_rating,
            rating_count = aggregate.rating_count,
            "Rating recorded"
        );

        self.publish(BookEvent::rating(id, aggregate)).await;
        Ok(aggregate)
    }

    /// Append a comment to a book's thread and publish it.
    ///
    /// The comment's display name is the caller's, captured now.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Validation`]: blank text
    /// - [`EngagementError::NotFound`]: unknown or malformed book id
    /// - [`EngagementError::Persistence`]: store failure or retries exhausted
    pub async fn post_comment(
        &self,
        book_id: &str,
        raw_text: &str,
        caller: Option<&Caller>,
    ) -> Result<Comment, EngagementError> {
        let result = self.comment(book_id, raw_text, caller).await;
        observe("post_comment", book_id, &result);
        result
    }

    async fn comment(
        &self,
        book_id: &str,
        raw_text: &str,
        caller: Option<&Caller>,
    ) -> Result<Comment, EngagementError> {
        let caller = authenticated(caller)?;
        comment::validate_text(raw_text)?;
        let id = BookId::parse(book_id)?;

        let created = retry_on_conflict(&self.retry, "post_comment", |attempt| {
            self.comment_once(id, caller, raw_text, attempt)
        })
        .await?;

        EngagementMetrics::record_comment();
        info!(
            book_id = %id,
            user_id = %caller.user_id,
            length = created.text.len(),
            "Comment posted"
        );

        self.publish(BookEvent::comment(id, created.clone())).await;
        Ok(created)
    }

    async fn rate_once(
        &self,
        id: BookId,
        rating: Rating,
        attempt: usize,
    ) -> Result<Book, AttemptError> {
        let mut book = self.require(id).await?;
        book.set_rating(book.rating().record(rating));

        let expected = book.version;
        debug!(book_id = %id, attempt, expected, "Saving rating");
        Ok(self.save(book, expected).await?)
    }

    async fn comment_once(
        &self,
        id: BookId,
        caller: &Caller,
        raw_text: &str,
        attempt: usize,
    ) -> Result<Comment, AttemptError> {
        let mut book = self.require(id).await?;
        let created = comment::append(
            &mut book,
            &caller.user_id,
            &caller.display_name,
            raw_text,
            self.clock.now(),
        )?;

        let expected = book.version;
        debug!(book_id = %id, attempt, expected, "Saving comment");
        self.save(book, expected).await?;
        Ok(created)
    }

    /// Load one book.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::NotFound`]: unknown or malformed book id
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn get_book(&self, book_id: &str) -> Result<Book, EngagementError> {
        let result = match BookId::parse(book_id) {
            Ok(id) => self.require(id).await,
            Err(err) => Err(err),
        };
        observe("get_book", book_id, &result);
        result
    }

    /// Every book in the catalog, ordered by title (case-insensitive), then id.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Persistence`] on store failure.
    pub async fn list_books(&self) -> Result<Vec<Book>, EngagementError> {
        let mut books = timed("list", self.books.list()).await.map_err(|err| {
            error!(error = %err, "Failed to list books");
            EngagementError::from(err)
        })?;
        books.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        Ok(books)
    }

    /// Add a book to the catalog.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::Validation`]: blank title or inconsistent initial aggregate
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn create_book(&self, entry: NewBook) -> Result<Book, EngagementError> {
        let book = Book::create(entry)?;
        let stored = timed("insert", self.books.insert(book)).await?;
        info!(book_id = %stored.id, title = %stored.title, "Book created");
        Ok(stored)
    }

    /// Insert catalog entries when the catalog is empty.
    ///
    /// Every entry is validated before anything is inserted. Returns how many
    /// books were inserted (zero when the catalog already had books).
    ///
    /// # Errors
    ///
    /// - [`EngagementError::Validation`]: an entry is invalid
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn seed_catalog(&self, entries: Vec<NewBook>) -> Result<usize, EngagementError> {
        let existing = timed("count", self.books.count()).await?;
        if existing > 0 {
            info!(existing, "Catalog already populated, skipping seed");
            return Ok(0);
        }

        let books = entries
            .into_iter()
            .map(Book::create)
            .collect::<Result<Vec<_>, _>>()?;
        let total = books.len();
        for book in books {
            timed("insert", self.books.insert(book)).await?;
        }

        info!(inserted = total, "Catalog seeded");
        Ok(total)
    }

    async fn require(&self, id: BookId) -> Result<Book, EngagementError> {
        timed("load", self.books.load(id))
            .await?
            .ok_or_else(|| EngagementError::not_found("Book", id))
    }

    async fn save(&self, book: Book, expected_version: u64) -> Result<Book, StoreError> {
        timed("save", self.books.save(book, expected_version)).await
    }

    async fn publish(&self, event: BookEvent) {
        let channel = event.channel();
        let kind = event.kind();
        match self.broadcaster.broadcast(channel.clone(), event).await {
            Ok(receivers) => {
                FanoutMetrics::record_publish(receivers);
                debug!(channel = %channel, kind, receivers, "Event published");
            }
            Err(err) => {
                FanoutMetrics::record_failure();
                warn!(channel = %channel, kind, error = %err, "Failed to publish event");
            }
        }
    }
}

async fn timed<T>(
    operation: &'static str,
    future: impl Future<Output = Result<T, StoreError>>,
) -> Result<T, StoreError> {
    let start = Instant::now();
    let result = future.await;
    StoreMetrics::record_operation(operation, start.elapsed());
    result
}

fn observe<T>(operation: &'static str, book_id: &str, result: &Result<T, EngagementError>) {
    if let Err(err) = result {
        EngagementMetrics::record_rejection(operation, err.kind());
        if err.is_system_fault() {
            error!(operation, book_id, error = %err, "Engagement operation failed");
        } else {
            debug!(operation, book_id, kind = err.kind(), error = %err, "Engagement request rejected");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)] // Test code
mod tests {
    use super::*;
    use bookshelf_core::{BookUpdate, FanoutError, UserId};
    use bookshelf_testing::{
        InMemoryBookStore, RecordingBroadcaster, fixtures, mocks::SteppingClock, test_clock,
    };
    use chrono::Duration;
    use serde_json::json;

    struct Harness {
        books: Arc<InMemoryBookStore>,
        broadcaster: Arc<RecordingBroadcaster>,
        service: EngagementService,
    }

    fn harness() -> Harness {
        let books = Arc::new(InMemoryBookStore::new());
        let broadcaster = Arc::new(RecordingBroadcaster::new());
        let service = EngagementService::new(
            Arc::clone(&books) as Arc<dyn BookStore>,
            Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
            Arc::new(test_clock()),
        )
        .with_retry_policy(RetryPolicy::immediate(3));
        Harness {
            books,
            broadcaster,
            service,
        }
    }

    async fn stored(h: &Harness, title: &str) -> Book {
        h.books.insert(fixtures::book(title)).await.unwrap()
    }

    #[tokio::test]
    async fn ratings_update_the_running_average() {
        let h = harness();
        let book = stored(&h, "Shadows of the Past").await;
        let id = book.id.to_string();

        let first = h
            .service
            .submit_rating(&id, &json!(4), Some(&fixtures::reader("u1")))
            .await
            .unwrap();
        assert_eq!(first, RatingAggregate::new(4.0, 1));

        let second = h
            .service
            .submit_rating(&id, &json!("2"), Some(&fixtures::reader("u2")))
            .await
            .unwrap();
        assert_eq!(second, RatingAggregate::new(3.0, 2));

        let reloaded = h.service.get_book(&id).await.unwrap();
        assert_eq!(reloaded.rating(), second);
        assert_eq!(reloaded.version, 3);
    }

    #[tokio::test]
    async fn malformed_ids_on_reads_are_counted_as_rejections() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let _guard = ::metrics::set_default_local_recorder(&recorder);
        let h = harness();

        let err = h.service.get_book("not-a-book").await.unwrap_err();

        assert!(matches!(err, EngagementError::NotFound { .. }));
        let rendered = handle.render();
        assert!(rendered.contains("bookshelf_rejected_requests_total"));
        assert!(rendered.contains(r#"operation="get_book""#));
        assert!(rendered.contains(r#"kind="NotFound""#));
    }

    #[tokio::test]
    async fn rating_is_published_once_with_persisted_values() {
        let h = harness();
        let book = stored(&h, "Echoes").await;

        h.service
            .submit_rating(&book.id.to_string(), &json!(5), Some(&fixtures::reader("u1")))
            .await
            .unwrap();

        let published = h.broadcaster.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, book.id.channel());
        assert_eq!(
            published[0].1.update,
            BookUpdate::Rating(RatingAggregate::new(5.0, 1))
        );
    }

    #[tokio::test]
    async fn unauthenticated_rating_changes_nothing() {
        let h = harness();
        let book = stored(&h, "Locked").await;
        let id = book.id.to_string();

        let err = h.service.submit_rating(&id, &json!(4), None).await.unwrap_err();

        assert_eq!(err, EngagementError::AuthenticationRequired);
        assert_eq!(h.service.get_book(&id).await.unwrap(), book);
        assert!(h.broadcaster.events().is_empty());
    }

    #[tokio::test]
    async fn invalid_ratings_change_nothing() {
        let h = harness();
        let book = stored(&h, "Strict").await;
        let id = book.id.to_string();
        let caller = fixtures::reader("u1");

        for raw in [json!(0), json!(6), json!(-1), json!("abc"), json!(3.5)] {
            let err = h.service.submit_rating(&id, &raw, Some(&caller)).await.unwrap_err();
            assert!(matches!(err, EngagementError::Validation(_)), "{raw}");
        }

        assert_eq!(h.service.get_book(&id).await.unwrap(), book);
        assert!(h.broadcaster.events().is_empty());
        assert_eq!(h.books.save_attempts(), 0);
    }

    #[tokio::test]
    async fn validation_precedes_lookup() {
        let h = harness();
        let caller = fixtures::reader("u1");
        let missing = BookId::new().to_string();

        let err = h.service.submit_rating(&missing, &json!(9), Some(&caller)).await.unwrap_err();
        assert!(matches!(err, EngagementError::Validation(_)));

        let err = h.service.submit_rating(&missing, &json!(3), Some(&caller)).await.unwrap_err();
        assert!(matches!(err, EngagementError::NotFound { .. }));
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_not_found() {
        let h = harness();
        for id in [BookId::new().to_string(), "not-an-id".to_string()] {
            assert!(matches!(
                h.service.get_book(&id).await,
                Err(EngagementError::NotFound { resource: "Book", .. })
            ));
        }
    }

    #[tokio::test]
    async fn conflicting_writes_are_retried_on_fresh_state() {
        let h = harness();
        let book = stored(&h, "Contended").await;
        h.books.fail_next_saves_with_conflict(2);

        let aggregate = h
            .service
            .submit_rating(&book.id.to_string(), &json!(4), Some(&fixtures::reader("u1")))
            .await
            .unwrap();

        assert_eq!(aggregate, RatingAggregate::new(4.0, 1));
        assert_eq!(h.books.save_attempts(), 3);
        assert_eq!(h.broadcaster.events().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_fail_without_publishing() {
        let h = harness();
        let book = stored(&h, "Hot").await;
        h.books.fail_next_saves_with_conflict(10);

        let err = h
            .service
            .submit_rating(&book.id.to_string(), &json!(4), Some(&fixtures::reader("u1")))
            .await
            .unwrap_err();

        assert!(matches!(err, EngagementError::Persistence(_)));
        assert_eq!(h.books.save_attempts(), 4);
        assert!(h.broadcaster.events().is_empty());
        assert_eq!(h.books.get(book.id).unwrap().rating_count, 0);
    }

    #[tokio::test]
    async fn store_failures_are_not_retried() {
        let h = harness();
        let book = stored(&h, "Fragile").await;
        h.books.fail_next_save(StoreError::Database("connection reset".to_string()));

        let err = h
            .service
            .post_comment(&book.id.to_string(), "hello", Some(&fixtures::reader("u1")))
            .await
            .unwrap_err();

        assert!(err.is_system_fault());
        assert_eq!(h.books.save_attempts(), 1);
        assert!(h.broadcaster.events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_ratings_are_not_lost() {
        let books = Arc::new(InMemoryBookStore::new());
        let book = books.insert(fixtures::book("Popular")).await.unwrap();
        let service = EngagementService::new(
            Arc::clone(&books) as Arc<dyn BookStore>,
            Arc::new(RecordingBroadcaster::new()),
            Arc::new(test_clock()),
        )
        .with_retry_policy(RetryPolicy::immediate(64));

        let ratings = [5, 4, 3, 2, 1, 5, 4, 3, 2, 1, 5, 5, 5, 1, 1, 3];
        let tasks: Vec<_> = ratings
            .iter()
            .enumerate()
            .map(|(i, rating)| {
                let service = service.clone();
                let id = book.id.to_string();
                let rating = *rating;
                tokio::spawn(async move {
                    let caller = fixtures::reader(&format!("u{i}"));
                    service.submit_rating(&id, &json!(rating), Some(&caller)).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = books.get(book.id).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let mean = f64::from(ratings.iter().sum::<i32>()) / ratings.len() as f64;
        assert_eq!(stored.rating_count, ratings.len() as u64);
        assert!((stored.average_rating - mean).abs() < 1e-9);
    }

    #[tokio::test]
    async fn comments_are_appended_and_published() {
        let h = harness();
        let book = stored(&h, "Talkative").await;
        let caller = Caller::new(UserId::new("u1"), "alice");

        let comment = h
            .service
            .post_comment(&book.id.to_string(), "  Great read!  ", Some(&caller))
            .await
            .unwrap();

        assert_eq!(comment.text, "Great read!");
        assert_eq!(comment.username, "alice");
        assert_eq!(comment.created_at, test_clock().now());

        let reloaded = h.books.get(book.id).unwrap();
        assert_eq!(reloaded.comments, vec![comment.clone()]);
        assert_eq!(
            h.broadcaster.events(),
            vec![BookEvent::comment(book.id, comment)]
        );
    }

    #[tokio::test]
    async fn comments_keep_insertion_order() {
        let books = Arc::new(InMemoryBookStore::new());
        let book = books.insert(fixtures::book("Thread")).await.unwrap();
        let service = EngagementService::new(
            Arc::clone(&books) as Arc<dyn BookStore>,
            Arc::new(RecordingBroadcaster::new()),
            Arc::new(SteppingClock::new(test_clock().now(), Duration::seconds(1))),
        );
        let id = book.id.to_string();
        let caller = fixtures::reader("u1");

        for text in ["first", "second", "third"] {
            service.post_comment(&id, text, Some(&caller)).await.unwrap();
        }

        let thread = books.get(book.id).unwrap().comments;
        let texts: Vec<_> = thread.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert!(thread.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn blank_comments_change_nothing() {
        let h = harness();
        let book = stored(&h, "Quiet").await;

        let err = h
            .service
            .post_comment(&book.id.to_string(), "   ", Some(&fixtures::reader("u1")))
            .await
            .unwrap_err();

        assert_eq!(err, EngagementError::validation("Comment text required"));
        assert!(h.books.get(book.id).unwrap().comments.is_empty());
        assert!(h.broadcaster.events().is_empty());
    }

    #[tokio::test]
    async fn unauthenticated_comment_is_rejected_first() {
        let h = harness();
        let err = h.service.post_comment("whatever", "   ", None).await.unwrap_err();
        assert_eq!(err, EngagementError::AuthenticationRequired);
    }

    #[tokio::test]
    async fn broadcast_failure_does_not_fail_the_write() {
        let h = harness();
        let book = stored(&h, "Offline").await;
        h.broadcaster.fail_with(FanoutError::Transport("broker down".to_string()));

        let aggregate = h
            .service
            .submit_rating(&book.id.to_string(), &json!(3), Some(&fixtures::reader("u1")))
            .await
            .unwrap();

        assert_eq!(aggregate.rating_count, 1);
        assert_eq!(h.books.get(book.id).unwrap().rating_count, 1);
    }

    #[tokio::test]
    async fn reads_are_idempotent() {
        let h = harness();
        let book = stored(&h, "Stable").await;
        let id = book.id.to_string();

        let first = h.service.get_book(&id).await.unwrap();
        let second = h.service.get_book(&id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn list_orders_by_title_case_insensitively() {
        let h = harness();
        for title in ["whispers", "Echoes", "beacon"] {
            stored(&h, title).await;
        }

        let titles: Vec<_> = h
            .service
            .list_books()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["beacon", "Echoes", "whispers"]);
    }

    #[tokio::test]
    async fn empty_catalog_lists_nothing() {
        let h = harness();
        assert!(h.service.list_books().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seed_only_fills_an_empty_catalog() {
        let h = harness();
        let entries = vec![NewBook::titled("One"), NewBook::titled("Two")];

        assert_eq!(h.service.seed_catalog(entries.clone()).await.unwrap(), 2);
        assert_eq!(h.service.seed_catalog(entries).await.unwrap(), 0);
        assert_eq!(h.books.len(), 2);
    }

    #[tokio::test]
    async fn seed_rejects_invalid_entries_before_inserting() {
        let h = harness();
        let entries = vec![NewBook::titled("Fine"), NewBook::titled("  ")];

        let err = h.service.seed_catalog(entries).await.unwrap_err();
        assert!(matches!(err, EngagementError::Validation(_)));
        assert!(h.books.is_empty());
    }

    #[tokio::test]
    async fn load_failures_surface_as_persistence_errors() {
        let h = harness();
        let book = stored(&h, "Unreachable").await;
        h.books.fail_loads(Some(StoreError::Database("timeout".to_string())));

        let err = h.service.get_book(&book.id.to_string()).await.unwrap_err();
        assert_eq!(err.kind(), "PersistenceFailure");
        assert!(h.service.list_books().await.unwrap_err().is_system_fault());
    }
}
