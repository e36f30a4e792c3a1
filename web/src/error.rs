//! Error types for web handlers.
//!
//! Every failure leaving the HTTP surface is an [`AppError`]: a status code,
//! a stable machine-readable code and a message safe to show to clients.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use bookshelf_core::EngagementError;
use serde::Serialize;
use std::fmt;

/// Message returned for every server-side fault.
const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Book>, AppError> {
///     let book = state.engagement.get_book(&id).await?;
///     Ok(Json(book))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal cause, logged but never sent to the client
    source: Option<String>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            source: None,
        }
    }

    /// Attach an internal cause for logging.
    #[must_use]
    pub fn with_source(mut self, source: impl fmt::Display) -> Self {
        self.source = Some(source.to_string());
        self
    }

    /// Create a 400 Bad Request error for malformed input.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// Create a 400 error for input that failed a domain precondition.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "VALIDATION_ERROR")
    }

    /// Create a 413 error for a body over the configured limit.
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            message.into(),
            "PAYLOAD_TOO_LARGE",
        )
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED")
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message.into(), "NOT_FOUND")
    }

    /// Create a 500 Internal Server Error with the generic message.
    #[must_use]
    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            INTERNAL_MESSAGE.to_string(),
            "INTERNAL_SERVER_ERROR",
        )
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code of this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl From<EngagementError> for AppError {
    fn from(err: EngagementError) -> Self {
        match err {
            EngagementError::Validation(message) => Self::validation(message),
            EngagementError::AuthenticationRequired => Self::unauthorized(err.to_string()),
            EngagementError::Forbidden(_) => Self::forbidden(err.to_string()),
            EngagementError::NotFound { .. } => Self::not_found(err.to_string()),
            EngagementError::Persistence(cause) => Self::internal().with_source(cause),
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                code = self.code,
                error = self.source.as_deref().unwrap_or(&self.message),
                "Internal server error"
            );
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}
