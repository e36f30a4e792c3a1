//! Integration tests for engagement writes reaching realtime subscribers.
//!
//! Wires `EngagementService` to a real `TopicBroadcaster` and checks what
//! subscribers of each book channel observe.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use bookshelf_core::{BookEvent, BookStore, BookUpdate, Broadcaster, RatingAggregate};
use bookshelf_runtime::{EngagementService, RetryPolicy, TopicBroadcaster};
use bookshelf_testing::{InMemoryBookStore, fixtures, test_clock};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

// ============================================================================
// Test Fixtures
// ============================================================================

struct World {
    books: Arc<InMemoryBookStore>,
    broadcaster: Arc<TopicBroadcaster>,
    service: EngagementService,
}

fn world() -> World {
    let books = Arc::new(InMemoryBookStore::new());
    let broadcaster = Arc::new(TopicBroadcaster::new());
    let service = EngagementService::new(
        Arc::clone(&books) as Arc<dyn BookStore>,
        Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
        Arc::new(test_clock()),
    )
    .with_retry_policy(RetryPolicy::immediate(3));
    World {
        books,
        broadcaster,
        service,
    }
}

async fn next_event(stream: &mut bookshelf_core::EventStream) -> BookEvent {
    tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("event within a second")
        .expect("stream still open")
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn subscribers_see_ratings_and_comments_in_order() {
    let w = world();
    let book = w.books.insert(fixtures::book("Shadows of the Past")).await.unwrap();
    let id = book.id.to_string();
    let mut events = w.broadcaster.subscribe(book.id.channel()).await.unwrap();

    assert_ok!(
        w.service
            .submit_rating(&id, &json!(4), Some(&fixtures::reader("u1")))
            .await
    );
    assert_ok!(
        w.service
            .submit_rating(&id, &json!(2), Some(&fixtures::reader("u2")))
            .await
    );
    let comment = assert_ok!(
        w.service
            .post_comment(&id, "Great read!", Some(&fixtures::reader("u1")))
            .await
    );

    assert_eq!(
        next_event(&mut events).await,
        BookEvent::rating(book.id, RatingAggregate::new(4.0, 1))
    );
    assert_eq!(
        next_event(&mut events).await,
        BookEvent::rating(book.id, RatingAggregate::new(3.0, 2))
    );
    assert_eq!(
        next_event(&mut events).await.update,
        BookUpdate::Comment(comment)
    );
}

#[tokio::test]
async fn events_never_cross_book_channels() {
    let w = world();
    let a = w.books.insert(fixtures::book("Book A")).await.unwrap();
    let b = w.books.insert(fixtures::book("Book B")).await.unwrap();
    let mut only_b = w.broadcaster.subscribe(b.id.channel()).await.unwrap();

    w.service
        .submit_rating(&a.id.to_string(), &json!(5), Some(&fixtures::reader("u1")))
        .await
        .unwrap();
    w.service
        .post_comment(&b.id.to_string(), "on B", Some(&fixtures::reader("u1")))
        .await
        .unwrap();

    let event = next_event(&mut only_b).await;
    assert_eq!(event.book_id, b.id);
    assert_eq!(event.kind(), "comment");
}

#[tokio::test]
async fn rejected_writes_publish_nothing() {
    let w = world();
    let book = w.books.insert(fixtures::book("Guarded")).await.unwrap();
    let id = book.id.to_string();
    let mut events = w.broadcaster.subscribe(book.id.channel()).await.unwrap();

    assert!(w.service.submit_rating(&id, &json!(4), None).await.is_err());
    assert!(
        w.service
            .post_comment(&id, "  ", Some(&fixtures::reader("u1")))
            .await
            .is_err()
    );
    w.service
        .submit_rating(&id, &json!(1), Some(&fixtures::reader("u1")))
        .await
        .unwrap();

    // The first thing observed is the one accepted write
    assert_eq!(
        next_event(&mut events).await,
        BookEvent::rating(book.id, RatingAggregate::new(1.0, 1))
    );
}

#[tokio::test]
async fn writes_succeed_without_any_subscriber() {
    let w = world();
    let book = w.books.insert(fixtures::book("Lonely")).await.unwrap();

    let aggregate = w
        .service
        .submit_rating(&book.id.to_string(), &json!(3), Some(&fixtures::reader("u1")))
        .await
        .unwrap();

    assert_eq!(aggregate, RatingAggregate::new(3.0, 1));
    assert_eq!(w.broadcaster.channel_count().await, 0);
}
