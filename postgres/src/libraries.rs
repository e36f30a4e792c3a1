//! Per-user reading lists.

use crate::{database_error, from_column_version, to_column_version};
use bookshelf_core::store::StoreFuture;
use bookshelf_core::{Library, LibraryStore, StoreError, UserId};
use sqlx::Row;
use sqlx::postgres::PgPool;
use sqlx::types::Json;

/// PostgreSQL-backed library store. One versioned row per user.
#[derive(Clone)]
pub struct PostgresLibraryStore {
    pool: PgPool,
}

impl PostgresLibraryStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, user_id: &UserId) -> Result<Option<u64>, StoreError> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM libraries WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;
        version.map(from_column_version).transpose()
    }

    async fn create(&self, library: &Library) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r"
            INSERT INTO libraries (user_id, version, document, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (user_id) DO NOTHING
            ",
        )
        .bind(library.user_id.as_str())
        .bind(to_column_version(library.version)?)
        .bind(Json(library))
        .execute(&self.pool)
        .await
        .map_err(database_error)?;
        Ok(result.rows_affected())
    }

    async fn update(&self, library: &Library, expected_version: u64) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r"
            UPDATE libraries
            SET version = $2, document = $3, updated_at = now()
            WHERE user_id = $1 AND version = $4
            ",
        )
        .bind(library.user_id.as_str())
        .bind(to_column_version(library.version)?)
        .bind(Json(library))
        .bind(to_column_version(expected_version)?)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;
        Ok(result.rows_affected())
    }
}

impl LibraryStore for PostgresLibraryStore {
    fn load(&self, user_id: UserId) -> StoreFuture<'_, Option<Library>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT version, document FROM libraries WHERE user_id = $1")
                .bind(user_id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;

            let Some(row) = row else {
                return Ok(None);
            };
            let version: i64 = row.try_get("version").map_err(database_error)?;
            let Json(mut library): Json<Library> =
                row.try_get("document").map_err(database_error)?;
            library.version = from_column_version(version)?;
            Ok(Some(library))
        })
    }

    fn save(&self, mut library: Library, expected_version: u64) -> StoreFuture<'_, Library> {
        Box::pin(async move {
            library.version = expected_version + 1;
            let written = if expected_version == 0 {
                self.create(&library).await?
            } else {
                self.update(&library, expected_version).await?
            };

            if written == 1 {
                tracing::debug!(
                    user_id = %library.user_id,
                    books = library.books.len(),
                    version = library.version,
                    "Library saved"
                );
                return Ok(library);
            }

            match self.current_version(&library.user_id).await? {
                Some(actual) => Err(StoreError::VersionConflict {
                    id: library.user_id.to_string(),
                    expected: expected_version,
                    actual,
                }),
                None => Err(StoreError::Missing(library.user_id.to_string())),
            }
        })
    }
}
