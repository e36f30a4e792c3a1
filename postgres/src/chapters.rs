//! Creator chapters.

use crate::database_error;
use bookshelf_core::store::StoreFuture;
use bookshelf_core::{Chapter, ChapterId, ChapterStore, StoreError, UserId};
use sqlx::postgres::PgPool;
use sqlx::types::Json;

/// PostgreSQL-backed chapter store.
///
/// `creator_id` and `updated_at` are copied out of the document so a
/// creator's chapters can be listed newest first from the index.
#[derive(Clone)]
pub struct PostgresChapterStore {
    pool: PgPool,
}

impl PostgresChapterStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl ChapterStore for PostgresChapterStore {
    fn load(&self, id: ChapterId) -> StoreFuture<'_, Option<Chapter>> {
        Box::pin(async move {
            let document: Option<Json<Chapter>> =
                sqlx::query_scalar("SELECT document FROM chapters WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(database_error)?;
            Ok(document.map(|Json(chapter)| chapter))
        })
    }

    fn save(&self, chapter: Chapter) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                r"
                INSERT INTO chapters (id, creator_id, document, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id)
                DO UPDATE SET document = EXCLUDED.document, updated_at = EXCLUDED.updated_at
                ",
            )
            .bind(chapter.id.as_uuid())
            .bind(chapter.creator.as_str())
            .bind(Json(&chapter))
            .bind(chapter.updated_at)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
            Ok::<(), StoreError>(())
        })
    }

    fn list_by_creator(&self, creator: UserId) -> StoreFuture<'_, Vec<Chapter>> {
        Box::pin(async move {
            let documents: Vec<Json<Chapter>> = sqlx::query_scalar(
                "SELECT document FROM chapters WHERE creator_id = $1 ORDER BY updated_at DESC, id",
            )
            .bind(creator.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;
            Ok(documents.into_iter().map(|Json(chapter)| chapter).collect())
        })
    }
}
