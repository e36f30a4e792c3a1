//! Recording broadcaster for asserting on fan-out.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

use bookshelf_core::{BookEvent, Broadcaster, EventStream, FanoutError};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<(String, BookEvent)>,
    failure: Option<FanoutError>,
}

/// Broadcaster that records every published event instead of delivering it.
///
/// Subscriptions yield nothing. Use the real `TopicBroadcaster` when a test
/// needs delivery.
///
/// # Example
///
/// ```
/// use bookshelf_testing::RecordingBroadcaster;
/// use bookshelf_core::{BookEvent, BookId, Broadcaster, RatingAggregate};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broadcaster = RecordingBroadcaster::new();
/// let id = BookId::new();
/// broadcaster
///     .broadcast(id.channel(), BookEvent::rating(id, RatingAggregate::new(4.0, 1)))
///     .await?;
///
/// assert_eq!(broadcaster.events().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingBroadcaster {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingBroadcaster {
    /// Create a new broadcaster with nothing recorded
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent broadcast fail with `error`.
    pub fn fail_with(&self, error: FanoutError) {
        self.inner.lock().unwrap().failure = Some(error);
    }

    /// `(channel, event)` pairs in publication order.
    #[must_use]
    pub fn published(&self) -> Vec<(String, BookEvent)> {
        self.inner.lock().unwrap().published.clone()
    }

    /// Events in publication order.
    #[must_use]
    pub fn events(&self) -> Vec<BookEvent> {
        self.published().into_iter().map(|(_, event)| event).collect()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.inner.lock().unwrap().published.clear();
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn broadcast(
        &self,
        channel: String,
        event: BookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<usize, FanoutError>> + Send + '_>> {
        Box::pin(async move {
            let mut inner = self.inner.lock().unwrap();
            if let Some(err) = &inner.failure {
                return Err(err.clone());
            }
            inner.published.push((channel, event));
            Ok(0)
        })
    }

    fn subscribe(
        &self,
        _channel: String,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, FanoutError>> + Send + '_>> {
        Box::pin(async move {
            let stream: EventStream = Box::pin(futures::stream::empty());
            Ok(stream)
        })
    }
}
