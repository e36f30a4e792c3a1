//! Chapter authoring and the creator dashboard.

use crate::error::AppError;
use crate::extractors::{JsonBody, MaybeCaller};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use bookshelf_core::caller::authenticated;
use bookshelf_core::{Chapter, ChapterDraft, CreatorStats};

/// `POST /api/chapters`: create, or update when the draft carries an id.
///
/// # Errors
///
/// `401` without a caller, `403` for readers and non-owners, `400` for a
/// blank title or content, `404` for an unknown chapter id.
pub async fn save_chapter(
    State(state): State<AppState>,
    caller: MaybeCaller,
    body: Result<JsonBody<ChapterDraft>, AppError>,
) -> Result<Json<Chapter>, AppError> {
    authenticated(caller.caller())?;
    let JsonBody(draft) = body?;
    Ok(Json(state.chapters.save(caller.caller(), draft).await?))
}

/// `GET /api/chapters/:id`
///
/// # Errors
///
/// `404` for unknown or malformed ids.
pub async fn get_chapter(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Chapter>, AppError> {
    Ok(Json(state.chapters.get(&id).await?))
}

/// `GET /api/creator/stats`
///
/// # Errors
///
/// `401` without a caller, `403` for readers.
pub async fn creator_stats(
    State(state): State<AppState>,
    caller: MaybeCaller,
) -> Result<Json<CreatorStats>, AppError> {
    Ok(Json(state.chapters.stats(caller.caller()).await?))
}

/// `GET /api/creator/recent-chapters`
///
/// # Errors
///
/// `401` without a caller, `403` for readers.
pub async fn recent_chapters(
    State(state): State<AppState>,
    caller: MaybeCaller,
) -> Result<Json<Vec<Chapter>>, AppError> {
    Ok(Json(state.chapters.recent(caller.caller()).await?))
}
