//! Router configuration.
//!
//! Builds the complete Axum router with all endpoints and layers.

use crate::handlers::{books, chapters, health, library, websocket};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header, request::Parts},
    routing::{delete, get, post},
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

/// Default JSON body limit (10 MiB).
pub const DEFAULT_BODY_LIMIT: usize = 10 * 1024 * 1024;

/// Origins on this host suffix are always allowed.
const HOSTED_ORIGIN_SUFFIX: &str = ".onrender.com";

/// HTTP-level settings for [`build_router`].
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origins allowed to make credentialed cross-origin requests
    pub allowed_origins: Vec<String>,
    /// Maximum request body size in bytes
    pub body_limit: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
            ],
            body_limit: DEFAULT_BODY_LIMIT,
        }
    }
}

/// Build the complete Axum router.
///
/// | Verb | Path |
/// |---|---|
/// | GET | `/health`, `/metrics`, `/ws` |
/// | GET | `/api/books`, `/api/books/:id` |
/// | POST | `/api/books/:id/rate`, `/api/books/:id/comments` |
/// | GET, POST, DELETE | `/api/library`, `/api/library/add`, `/api/library/remove/:id` |
/// | POST, GET | `/api/chapters`, `/api/chapters/:id` |
/// | GET | `/api/creator/stats`, `/api/creator/recent-chapters` |
pub fn build_router(state: AppState, config: &RouterConfig) -> Router {
    let api_routes = Router::new()
        // Catalog and engagement
        .route("/books", get(books::list_books))
        .route("/books/:id", get(books::get_book))
        .route("/books/:id/rate", post(books::rate_book))
        .route("/books/:id/comments", post(books::post_comment))
        // Personal library
        .route("/library", get(library::get_library))
        .route("/library/add", post(library::add_to_library))
        .route("/library/remove/:id", delete(library::remove_from_library))
        // Creator tools
        .route("/chapters", post(chapters::save_chapter))
        .route("/chapters/:id", get(chapters::get_chapter))
        .route("/creator/stats", get(chapters::creator_stats))
        .route("/creator/recent-chapters", get(chapters::recent_chapters));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .route("/ws", get(websocket::handle))
        .nest("/api", api_routes)
        // The tower-http limit replaces axum's 2 MiB extractor default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.body_limit))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim()).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                allowed.contains(origin) || is_hosted_origin(origin)
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

fn is_hosted_origin(origin: &HeaderValue) -> bool {
    origin.to_str().is_ok_and(|origin| {
        origin.starts_with("https://") && origin.ends_with(HOSTED_ORIGIN_SUFFIX)
    })
}
