//! Shared harness for the HTTP and WebSocket tests.

#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)] // Test code

use bookshelf_core::{Book, BookStore, Broadcaster, Caller};
use bookshelf_runtime::{
    ChapterService, EngagementService, LibraryService, RetryPolicy, TopicBroadcaster,
};
use bookshelf_testing::{
    InMemoryBookStore, InMemoryChapterStore, InMemoryLibraryStore, fixtures, test_clock,
};
use bookshelf_web::{AppState, AssetResolver, JwtVerifier, RouterConfig, build_router};
use axum::Router;
use std::sync::Arc;

pub const SECRET: &[u8] = b"integration-test-secret";
pub const PUBLIC_BASE_URL: &str = "http://assets.test";

pub struct TestApp {
    pub books: Arc<InMemoryBookStore>,
    pub broadcaster: Arc<TopicBroadcaster>,
    pub state: AppState,
    verifier: JwtVerifier,
}

impl TestApp {
    pub fn new() -> Self {
        let books = Arc::new(InMemoryBookStore::new());
        let broadcaster = Arc::new(TopicBroadcaster::new());
        let clock = Arc::new(test_clock());
        let engagement = EngagementService::new(
            Arc::clone(&books) as Arc<dyn BookStore>,
            Arc::clone(&broadcaster) as Arc<dyn Broadcaster>,
            clock.clone(),
        )
        .with_retry_policy(RetryPolicy::immediate(3));
        let library = LibraryService::new(Arc::new(InMemoryLibraryStore::new()));
        let chapters = ChapterService::new(Arc::new(InMemoryChapterStore::new()), clock);
        let verifier = JwtVerifier::new(SECRET, None).unwrap();

        let state = AppState::new(
            engagement,
            library,
            chapters,
            verifier.clone(),
            AssetResolver::new(PUBLIC_BASE_URL),
        );

        Self {
            books,
            broadcaster,
            state,
            verifier,
        }
    }

    pub fn router(&self) -> Router {
        self.router_with(&RouterConfig::default())
    }

    pub fn router_with(&self, config: &RouterConfig) -> Router {
        build_router(self.state.clone(), config)
    }

    pub async fn insert(&self, book: Book) -> Book {
        self.books.insert(book).await.unwrap()
    }

    pub async fn book(&self, title: &str) -> Book {
        self.insert(fixtures::book(title)).await
    }

    pub fn bearer(&self, caller: &Caller) -> String {
        let token = self
            .verifier
            .issue(caller, chrono::Duration::minutes(10))
            .unwrap();
        format!("Bearer {token}")
    }
}
