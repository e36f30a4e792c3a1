//! In-process topic broadcaster.
//!
//! Each channel (`bookUpdated:<id>`) is backed by its own tokio broadcast
//! channel, created on first subscription. Publishing to a channel nobody
//! subscribes to is a no-op and never allocates.
//!
//! ```text
//! EngagementService ── broadcast("bookUpdated:A") ──► sender A ──► subscriber 1
//!                                                            └──► subscriber 2
//!                                                     sender B ──► subscriber 3
//! ```
//!
//! Subscribers that fall more than `capacity` events behind skip the oldest
//! events instead of slowing publishers down. Channels whose last subscriber
//! went away are dropped the next time something is published to them, or
//! on [`TopicBroadcaster::prune`].

use crate::metrics::FanoutMetrics;
use bookshelf_core::{BookEvent, Broadcaster, EventStream, FanoutError};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

/// Events buffered per channel before slow subscribers start skipping.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Type alias for the channels map to reduce complexity.
type ChannelsMap = Arc<RwLock<HashMap<String, broadcast::Sender<BookEvent>>>>;

/// Topic broadcaster for per-book realtime channels.
///
/// Cheap to clone; clones share the same channels.
///
/// # Example
///
/// ```
/// use bookshelf_runtime::TopicBroadcaster;
/// use bookshelf_core::{BookEvent, BookId, Broadcaster, RatingAggregate};
/// use futures::StreamExt;
///
/// # async fn example() -> Result<(), bookshelf_core::FanoutError> {
/// let broadcaster = TopicBroadcaster::new();
/// let id = BookId::new();
///
/// let mut events = broadcaster.subscribe(id.channel()).await?;
/// broadcaster
///     .broadcast(id.channel(), BookEvent::rating(id, RatingAggregate::new(5.0, 1)))
///     .await?;
///
/// let event = events.next().await;
/// assert_eq!(event.map(|e| e.book_id), Some(id));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct TopicBroadcaster {
    /// Map of channel name → broadcast sender
    channels: ChannelsMap,
    capacity: usize,
}

impl TopicBroadcaster {
    /// Create a new broadcaster with the default per-channel buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broadcaster buffering `capacity` events per channel.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Number of channels with a live sender.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Number of live subscriptions on a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Drop every channel that has no subscribers left.
    ///
    /// Returns how many channels were dropped.
    pub async fn prune(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    async fn publish(&self, channel: String, event: BookEvent) -> usize {
        let sent = {
            let channels = self.channels.read().await;
            match channels.get(&channel) {
                Some(sender) => sender.send(event).ok(),
                None => return 0,
            }
        };

        if let Some(receivers) = sent {
            receivers
        } else {
            // Every receiver is gone
            let mut channels = self.channels.write().await;
            if channels
                .get(&channel)
                .is_some_and(|sender| sender.receiver_count() == 0)
            {
                channels.remove(&channel);
                debug!(channel = %channel, "Dropped channel without subscribers");
            }
            0
        }
    }

    async fn open(&self, channel: String) -> EventStream {
        let mut rx = {
            let mut channels = self.channels.write().await;
            channels
                .entry(channel.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        FanoutMetrics::record_lagged(skipped);
                        warn!(channel = %channel, skipped, "Subscriber lagging, skipped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(channel = %channel, "Channel closed");
                        break;
                    }
                }
            }
        })
    }
}

impl Default for TopicBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster for TopicBroadcaster {
    fn broadcast(
        &self,
        channel: String,
        event: BookEvent,
    ) -> Pin<Box<dyn Future<Output = Result<usize, FanoutError>> + Send + '_>> {
        Box::pin(async move { Ok(self.publish(channel, event).await) })
    }

    fn subscribe(
        &self,
        channel: String,
    ) -> Pin<Box<dyn Future<Output = Result<EventStream, FanoutError>> + Send + '_>> {
        Box::pin(async move { Ok(self.open(channel).await) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code
mod tests {
    use super::*;
    use bookshelf_core::{BookId, RatingAggregate};
    use futures::StreamExt;

    fn rating(id: BookId, count: u64) -> BookEvent {
        BookEvent::rating(id, RatingAggregate::new(4.0, count))
    }

    #[tokio::test]
    async fn publishing_without_subscribers_creates_nothing() {
        let broadcaster = TopicBroadcaster::new();
        let id = BookId::new();

        let delivered = broadcaster.broadcast(id.channel(), rating(id, 1)).await.unwrap();

        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.channel_count().await, 0);
    }

    #[tokio::test]
    async fn every_subscriber_receives_the_event() {
        let broadcaster = TopicBroadcaster::new();
        let id = BookId::new();

        let mut first = broadcaster.subscribe(id.channel()).await.unwrap();
        let mut second = broadcaster.subscribe(id.channel()).await.unwrap();

        let delivered = broadcaster.broadcast(id.channel(), rating(id, 1)).await.unwrap();
        assert_eq!(delivered, 2);

        assert_eq!(first.next().await.expect("first receives"), rating(id, 1));
        assert_eq!(second.next().await.expect("second receives"), rating(id, 1));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let broadcaster = TopicBroadcaster::new();
        let a = BookId::new();
        let b = BookId::new();

        let mut on_a = broadcaster.subscribe(a.channel()).await.unwrap();
        let mut on_b = broadcaster.subscribe(b.channel()).await.unwrap();

        broadcaster.broadcast(a.channel(), rating(a, 1)).await.unwrap();
        broadcaster.broadcast(b.channel(), rating(b, 7)).await.unwrap();

        assert_eq!(on_a.next().await.unwrap().book_id, a);
        let on_b_event = on_b.next().await.unwrap();
        assert_eq!(on_b_event.book_id, b);
        assert_eq!(on_b_event, rating(b, 7));
    }

    #[tokio::test]
    async fn late_subscribers_miss_earlier_events() {
        let broadcaster = TopicBroadcaster::new();
        let id = BookId::new();

        let _early = broadcaster.subscribe(id.channel()).await.unwrap();
        broadcaster.broadcast(id.channel(), rating(id, 1)).await.unwrap();

        let mut late = broadcaster.subscribe(id.channel()).await.unwrap();
        broadcaster.broadcast(id.channel(), rating(id, 2)).await.unwrap();

        assert_eq!(late.next().await.unwrap(), rating(id, 2));
    }

    #[tokio::test]
    async fn lagging_subscribers_skip_to_recent_events() {
        let broadcaster = TopicBroadcaster::with_capacity(2);
        let id = BookId::new();
        let mut slow = broadcaster.subscribe(id.channel()).await.unwrap();

        for count in 1..=5 {
            broadcaster.broadcast(id.channel(), rating(id, count)).await.unwrap();
        }

        assert_eq!(slow.next().await.unwrap(), rating(id, 4));
        assert_eq!(slow.next().await.unwrap(), rating(id, 5));
    }

    #[tokio::test]
    async fn abandoned_channels_are_dropped() {
        let broadcaster = TopicBroadcaster::new();
        let a = BookId::new();
        let b = BookId::new();

        let subscription = broadcaster.subscribe(a.channel()).await.unwrap();
        let _kept = broadcaster.subscribe(b.channel()).await.unwrap();
        assert_eq!(broadcaster.subscriber_count(&a.channel()).await, 1);
        drop(subscription);

        let delivered = broadcaster.broadcast(a.channel(), rating(a, 1)).await.unwrap();
        assert_eq!(delivered, 0);
        assert_eq!(broadcaster.channel_count().await, 1);
        assert_eq!(broadcaster.prune().await, 0);
    }
}
