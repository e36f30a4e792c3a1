//! Realtime fan-out of book mutations.
//!
//! After a rating or comment is persisted, the engagement service publishes a
//! [`BookEvent`] on the book's channel (`bookUpdated:<id>`). Every client
//! subscribed to that channel at emission time receives it; nobody else does.
//! Delivery is best-effort: no acknowledgement, no replay for late joiners.
//!
//! Events serialize as:
//!
//! ```json
//! { "bookId": "…", "type": "rating", "payload": { "averageRating": 3.0, "ratingCount": 2 } }
//! { "bookId": "…", "type": "comment", "payload": { "userId": "…", "username": "…", "text": "…", "createdAt": "…" } }
//! ```

use crate::book::BookId;
use crate::comment::Comment;
use crate::rating::RatingAggregate;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// What changed on a book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum BookUpdate {
    /// A rating was folded into the aggregate
    Rating(RatingAggregate),
    /// A comment was appended to the thread
    Comment(Comment),
}

/// A mutation event pushed to subscribers of one book.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEvent {
    /// Book the event concerns
    pub book_id: BookId,
    /// The change itself
    #[serde(flatten)]
    pub update: BookUpdate,
}

impl BookEvent {
    /// Event announcing a new rating aggregate.
    #[must_use]
    pub const fn rating(book_id: BookId, aggregate: RatingAggregate) -> Self {
        Self {
            book_id,
            update: BookUpdate::Rating(aggregate),
        }
    }

    /// Event announcing a new comment.
    #[must_use]
    pub const fn comment(book_id: BookId, comment: Comment) -> Self {
        Self {
            book_id,
            update: BookUpdate::Comment(comment),
        }
    }

    /// Channel this event is published on.
    #[must_use]
    pub fn channel(&self) -> String {
        self.book_id.channel()
    }

    /// Event type name (`rating` or `comment`).
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self.update {
            BookUpdate::Rating(_) => "rating",
            BookUpdate::Comment(_) => "comment",
        }
    }
}

/// Errors that can occur while broadcasting or subscribing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FanoutError {
    /// The broadcaster has shut down
    #[error("Broadcaster closed")]
    Closed,

    /// Network or broker error
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Stream of events delivered to one subscription.
///
/// Ends when the broadcaster drops the channel. Events missed by a slow
/// consumer are skipped, not replayed.
pub type EventStream = Pin<Box<dyn Stream<Item = BookEvent> + Send>>;

/// Process-wide publish/subscribe hub, keyed by channel.
///
/// Injected into the engagement service and the realtime endpoint, so tests
/// can substitute a recording fake and a multi-instance deployment can swap in
/// a shared broker without touching call sites.
pub trait Broadcaster: Send + Sync {
    /// Deliver an event to every current subscriber of `channel`.
    ///
    /// Returns the number of subscribers the event was handed to. Zero
    /// subscribers is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError`] if the transport fails.
    fn broadcast(
        &self,
        channel: String,
        event: BookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<usize, FanoutError>> + Send + '_>>;

    /// Open a subscription to `channel`.
    ///
    /// Only events broadcast after this call returns are delivered.
    ///
    /// # Errors
    ///
    /// Returns [`FanoutError`] if the transport fails.
    fn subscribe(
        &self,
        channel: String,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, FanoutError>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use crate::caller::UserId;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    #[test]
    fn rating_event_wire_shape() {
        let id = BookId::new();
        let event = BookEvent::rating(id, RatingAggregate::new(3.0, 2));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "bookId": id.to_string(),
                "type": "rating",
                "payload": { "averageRating": 3.0, "ratingCount": 2 }
            })
        );
        assert_eq!(event.kind(), "rating");
        assert_eq!(event.channel(), format!("bookUpdated:{id}"));
    }

    #[test]
    fn comment_event_round_trips() {
        let id = BookId::new();
        let comment = Comment {
            user_id: UserId::new("u1"),
            username: "alice@example.com".to_string(),
            text: "Loved it".to_string(),
            created_at: DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap(),
        };
        let event = BookEvent::comment(id, comment);

        let text = serde_json::to_string(&event).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "comment");
        assert_eq!(value["payload"]["text"], "Loved it");

        let decoded: BookEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(decoded, event);
    }
}
