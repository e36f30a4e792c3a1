//! Axum HTTP and WebSocket surface for Bookshelf.
//!
//! This crate is the imperative shell around the engagement services: it
//! verifies bearer tokens, parses requests, calls the services in
//! `bookshelf-runtime` and maps their results to HTTP responses.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Imperative Shell (Axum)         │  ← HTTP, JSON, WebSocket
//! │  - Caller extraction (JWT)              │  ← CORS, body limit
//! │  - Error → status mapping               │  ← Tracing, correlation ids
//! ├─────────────────────────────────────────┤
//! │         Services + Functional Core      │
//! │  - Rating aggregation, comment ledger   │
//! │  - Optimistic retries, fan-out          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use bookshelf_web::{AppState, RouterConfig, build_router};
//!
//! let state = AppState::new(engagement, library, chapters, verifier, assets);
//! let app = build_router(state, &RouterConfig::default());
//! axum::serve(listener, app).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod assets;
pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

// Re-export key types for convenience
pub use assets::AssetResolver;
pub use auth::{Claims, JwtVerifier, TokenError};
pub use error::AppError;
pub use extractors::{CorrelationId, JsonBody, MaybeCaller};
pub use middleware::{CORRELATION_ID_HEADER, correlation_id_layer};
pub use router::{RouterConfig, build_router};
pub use state::AppState;

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
