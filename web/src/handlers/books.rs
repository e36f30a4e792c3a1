//! Catalog reads and engagement writes.

use crate::error::AppError;
use crate::extractors::{CorrelationId, JsonBody, MaybeCaller};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use bookshelf_core::caller::authenticated;
use bookshelf_core::{Book, Comment, RatingAggregate};
use serde::Deserialize;
use serde_json::Value;

/// Body of `POST /api/books/:id/rate`.
#[derive(Debug, Deserialize)]
pub struct RateRequest {
    /// A JSON number or numeric string; checked by the service
    #[serde(default)]
    pub rating: Value,
}

/// Body of `POST /api/books/:id/comments`.
#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    /// Comment text
    #[serde(default)]
    pub text: String,
}

/// `GET /api/books`
///
/// # Errors
///
/// `500` on store failure.
pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<Book>>, AppError> {
    let books = state.engagement.list_books().await?;
    Ok(Json(
        books
            .into_iter()
            .map(|book| state.assets.resolve_book(book))
            .collect(),
    ))
}

/// `GET /api/books/:id`
///
/// # Errors
///
/// `404` for unknown or malformed ids.
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    let book = state.engagement.get_book(&id).await?;
    Ok(Json(state.assets.resolve_book(book)))
}

/// `POST /api/books/:id/rate`
///
/// Responds with the book's new `{averageRating, ratingCount}`.
///
/// # Errors
///
/// `401` without a caller, `400` for a rating outside `1..=5`, `404` for an
/// unknown book.
pub async fn rate_book(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    caller: MaybeCaller,
    Path(id): Path<String>,
    body: Result<JsonBody<RateRequest>, AppError>,
) -> Result<Json<RatingAggregate>, AppError> {
    tracing::debug!(%correlation_id, book_id = %id, "Rating submitted");
    // An anonymous caller is told to authenticate even when the body is bad
    authenticated(caller.caller())?;
    let JsonBody(body) = body?;
    let aggregate = state
        .engagement
        .submit_rating(&id, &body.rating, caller.caller())
        .await?;
    Ok(Json(aggregate))
}

/// `POST /api/books/:id/comments`
///
/// Responds `201` with the stored comment.
///
/// # Errors
///
/// `401` without a caller, `400` for blank text, `404` for an unknown book.
pub async fn post_comment(
    State(state): State<AppState>,
    CorrelationId(correlation_id): CorrelationId,
    caller: MaybeCaller,
    Path(id): Path<String>,
    body: Result<JsonBody<CommentRequest>, AppError>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    tracing::debug!(%correlation_id, book_id = %id, "Comment submitted");
    authenticated(caller.caller())?;
    let JsonBody(body) = body?;
    let comment = state
        .engagement
        .post_comment(&id, &body.text, caller.caller())
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
