//! Realtime book updates over WebSocket.
//!
//! A connection subscribes to any number of book channels and receives
//! every rating and comment event published on them.
//!
//! # Architecture
//!
//! ```text
//! Client              Connection task                Broadcaster
//!   │                        │                            │
//!   ├─ Connect (?book=id) ──>├─ subscribe(bookUpdated:id)>│
//!   ├─ Subscribe [ids] ─────>├─ subscribe(...) ──────────>│
//!   │<─ Subscribed [ids] ────┤                            │
//!   │                        │<── event (bookUpdated:id) ─┤
//!   │<─ Event ───────────────┤                            │
//! ```
//!
//! # Message Protocol
//!
//! **Client → Server:**
//! ```json
//! { "type": "subscribe", "books": ["<bookId>"] }
//! { "type": "unsubscribe", "books": ["<bookId>"] }
//! { "type": "ping" }
//! ```
//!
//! **Server → Client:**
//! ```json
//! { "type": "subscribed", "books": ["<bookId>"] }
//! { "type": "unsubscribed", "books": ["<bookId>"] }
//! { "type": "pong" }
//! { "type": "event", "channel": "bookUpdated:<bookId>",
//!   "event": { "bookId": "<bookId>", "type": "rating", "payload": { ... } } }
//! { "type": "error", "message": "..." }
//! ```

use crate::state::AppState;
use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use bookshelf_core::{BookEvent, BookId, Broadcaster, EventStream};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_stream::StreamMap;
use tracing::{debug, info, warn};

/// Query string of the upgrade request.
#[derive(Debug, Default, Deserialize)]
pub struct ConnectParams {
    /// Book to subscribe to immediately
    #[serde(default)]
    pub book: Option<String>,
}

/// Messages a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    /// Start receiving events for these books
    Subscribe {
        /// Book ids
        books: Vec<String>,
    },
    /// Stop receiving events for these books
    Unsubscribe {
        /// Book ids
        books: Vec<String>,
    },
    /// Keep-alive
    Ping,
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    /// Subscriptions are registered; events published from now on are delivered
    Subscribed {
        /// Book ids now subscribed
        books: Vec<String>,
    },
    /// Subscriptions are dropped
    Unsubscribed {
        /// Book ids no longer subscribed
        books: Vec<String>,
    },
    /// Reply to `ping`
    Pong,
    /// A book update
    Event {
        /// Channel the event was published on
        channel: String,
        /// The update
        event: BookEvent,
    },
    /// The client sent something unusable
    Error {
        /// Description
        message: String,
    },
}

/// `GET /ws`: upgrade to the realtime channel.
#[allow(clippy::unused_async)] // Axum handler signature requires async
pub async fn handle(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
) -> Response {
    let broadcaster = state.engagement.broadcaster();
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster, params.book))
}

/// Per-connection subscriptions, one event stream per book.
struct Subscriptions {
    broadcaster: Arc<dyn Broadcaster>,
    streams: StreamMap<BookId, EventStream>,
}

impl Subscriptions {
    fn new(broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            broadcaster,
            streams: StreamMap::new(),
        }
    }

    async fn subscribe(&mut self, books: Vec<String>) -> ServerMessage {
        let mut subscribed = Vec::with_capacity(books.len());
        let mut unknown = Vec::new();

        for raw in books {
            let Ok(id) = BookId::parse(&raw) else {
                unknown.push(raw);
                continue;
            };
            if !self.streams.contains_key(&id) {
                match self.broadcaster.subscribe(id.channel()).await {
                    Ok(stream) => {
                        self.streams.insert(id, stream);
                    }
                    Err(e) => {
                        warn!(book_id = %id, error = %e, "Subscription failed");
                        unknown.push(raw);
                        continue;
                    }
                }
            }
            let id = id.to_string();
            if !subscribed.contains(&id) {
                subscribed.push(id);
            }
        }

        if subscribed.is_empty() && !unknown.is_empty() {
            return ServerMessage::Error {
                message: format!("Cannot subscribe to {}", unknown.join(", ")),
            };
        }
        debug!(books = ?subscribed, total = self.streams.len(), "Subscribed");
        ServerMessage::Subscribed { books: subscribed }
    }

    fn unsubscribe(&mut self, books: Vec<String>) -> ServerMessage {
        let removed = books
            .iter()
            .filter_map(|raw| BookId::parse(raw).ok())
            .filter(|id| self.streams.remove(id).is_some())
            .map(|id| id.to_string())
            .collect();
        ServerMessage::Unsubscribed { books: removed }
    }

    async fn reply_to(&mut self, text: &str) -> ServerMessage {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(ClientMessage::Subscribe { books }) => self.subscribe(books).await,
            Ok(ClientMessage::Unsubscribe { books }) => self.unsubscribe(books),
            Ok(ClientMessage::Ping) => ServerMessage::Pong,
            Err(e) => {
                debug!(error = %e, "Unparsable WebSocket message");
                ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                }
            }
        }
    }
}

type Sink = SplitSink<WebSocket, Message>;

/// Send a message; `Err` means the client is gone.
async fn send(sink: &mut Sink, message: &ServerMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(message) {
        Ok(json) => sink.send(Message::Text(json)).await,
        Err(e) => {
            warn!(error = %e, "Failed to serialize WebSocket message");
            Ok(())
        }
    }
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<dyn Broadcaster>, book: Option<String>) {
    info!("WebSocket connection established");

    let (mut sink, mut incoming) = socket.split();
    let mut subscriptions = Subscriptions::new(broadcaster);

    if let Some(book) = book {
        let reply = subscriptions.subscribe(vec![book]).await;
        if send(&mut sink, &reply).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            message = incoming.next() => {
                let reply = match message {
                    Some(Ok(Message::Text(text))) => subscriptions.reply_to(&text).await,
                    Some(Ok(Message::Binary(_))) => ServerMessage::Error {
                        message: "Binary messages are not supported".to_string(),
                    },
                    // Protocol-level pings are answered by axum
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                };
                if send(&mut sink, &reply).await.is_err() {
                    break;
                }
            }
            Some((_, event)) = subscriptions.streams.next(), if !subscriptions.streams.is_empty() => {
                let message = ServerMessage::Event {
                    channel: event.channel(),
                    event,
                };
                if send(&mut sink, &message).await.is_err() {
                    break;
                }
            }
        }
    }

    info!(
        subscriptions = subscriptions.streams.len(),
        "WebSocket connection closed"
    );
}
