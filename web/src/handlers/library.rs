//! Personal reading lists.

use crate::error::AppError;
use crate::extractors::{JsonBody, MaybeCaller};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use bookshelf_core::caller::authenticated;
use bookshelf_core::{Library, LibraryEntry};
use serde::Deserialize;

/// Body of `POST /api/library/add`.
#[derive(Debug, Deserialize)]
pub struct AddRequest {
    /// The book to save
    pub book: LibraryEntry,
}

/// `GET /api/library`
///
/// # Errors
///
/// `401` without a caller.
pub async fn get_library(
    State(state): State<AppState>,
    caller: MaybeCaller,
) -> Result<Json<Library>, AppError> {
    Ok(Json(state.library.get(caller.caller()).await?))
}

/// `POST /api/library/add`
///
/// # Errors
///
/// `401` without a caller, `400` for an entry without an id.
pub async fn add_to_library(
    State(state): State<AppState>,
    caller: MaybeCaller,
    body: Result<JsonBody<AddRequest>, AppError>,
) -> Result<Json<Library>, AppError> {
    authenticated(caller.caller())?;
    let JsonBody(body) = body?;
    Ok(Json(state.library.add(caller.caller(), body.book).await?))
}

/// `DELETE /api/library/remove/:id`
///
/// # Errors
///
/// `401` without a caller, `404` if the caller has no library.
pub async fn remove_from_library(
    State(state): State<AppState>,
    caller: MaybeCaller,
    Path(book_id): Path<String>,
) -> Result<Json<Library>, AppError> {
    Ok(Json(state.library.remove(caller.caller(), &book_id).await?))
}
