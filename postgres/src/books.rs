//! Book documents with optimistic concurrency.

use crate::{database_error, from_column_version, to_column_version};
use bookshelf_core::store::StoreFuture;
use bookshelf_core::{Book, BookId, BookStore, StoreError};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::types::Json;
use sqlx::Row;

/// PostgreSQL-backed book store.
///
/// ```sql
/// CREATE TABLE books (
///     id UUID PRIMARY KEY,
///     title TEXT NOT NULL,
///     version BIGINT NOT NULL,
///     document JSONB NOT NULL,
///     ...
/// );
/// ```
///
/// The `version` column is authoritative; the copy inside the document is
/// overwritten on load.
#[derive(Clone)]
pub struct PostgresBookStore {
    pool: PgPool,
}

impl PostgresBookStore {
    /// Create a store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn current_version(&self, id: BookId) -> Result<Option<u64>, StoreError> {
        let version: Option<i64> = sqlx::query_scalar("SELECT version FROM books WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
        version.map(from_column_version).transpose()
    }
}

fn decode(row: &PgRow) -> Result<Book, StoreError> {
    let version: i64 = row.try_get("version").map_err(database_error)?;
    let Json(mut book): Json<Book> = row.try_get("document").map_err(database_error)?;
    book.version = from_column_version(version)?;
    Ok(book)
}

impl BookStore for PostgresBookStore {
    fn load(&self, id: BookId) -> StoreFuture<'_, Option<Book>> {
        Box::pin(async move {
            let row = sqlx::query("SELECT version, document FROM books WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(database_error)?;
            row.as_ref().map(decode).transpose()
        })
    }

    fn list(&self) -> StoreFuture<'_, Vec<Book>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT version, document FROM books ORDER BY lower(title), id")
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
            rows.iter().map(decode).collect()
        })
    }

    fn insert(&self, mut book: Book) -> StoreFuture<'_, Book> {
        Box::pin(async move {
            book.version = 1;
            let result = sqlx::query(
                r"
                INSERT INTO books (id, title, version, document)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (id) DO NOTHING
                ",
            )
            .bind(book.id.as_uuid())
            .bind(&book.title)
            .bind(to_column_version(book.version)?)
            .bind(Json(&book))
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Duplicate(book.id.to_string()));
            }

            tracing::debug!(book_id = %book.id, "Book inserted");
            Ok(book)
        })
    }

    fn save(&self, mut book: Book, expected_version: u64) -> StoreFuture<'_, Book> {
        Box::pin(async move {
            book.version = expected_version + 1;
            let result = sqlx::query(
                r"
                UPDATE books
                SET title = $2, version = $3, document = $4, updated_at = now()
                WHERE id = $1 AND version = $5
                ",
            )
            .bind(book.id.as_uuid())
            .bind(&book.title)
            .bind(to_column_version(book.version)?)
            .bind(Json(&book))
            .bind(to_column_version(expected_version)?)
            .execute(&self.pool)
            .await
            .map_err(database_error)?;

            if result.rows_affected() == 1 {
                return Ok(book);
            }

            // Nothing matched: either someone else saved first or the row is gone
            match self.current_version(book.id).await? {
                Some(actual) => Err(StoreError::VersionConflict {
                    id: book.id.to_string(),
                    expected: expected_version,
                    actual,
                }),
                None => Err(StoreError::Missing(book.id.to_string())),
            }
        })
    }

    fn count(&self) -> StoreFuture<'_, u64> {
        Box::pin(async move {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;
            from_column_version(count)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code
mod tests {
    use super::*;
    use bookshelf_core::rating::{Rating, RatingAggregate};
    use bookshelf_core::{Comment, UserId};
    use bookshelf_testing::fixtures;

    /// Encode and decode a book the way the `document` column does.
    fn through_document(book: &Book) -> Book {
        let bytes = serde_json::to_vec(&Json(book)).unwrap();
        let Json(decoded): Json<Book> = serde_json::from_slice(&bytes).unwrap();
        decoded
    }

    #[test]
    fn document_preserves_running_averages_exactly() {
        let mut book = fixtures::book("Whispers in the Dark");
        let mut aggregate = RatingAggregate::default();

        for i in 0..5_000_i64 {
            aggregate = aggregate.record(Rating::new(i * 7 % 5 + 1).unwrap());
            book.set_rating(aggregate);

            let decoded = through_document(&book);
            assert_eq!(
                decoded.average_rating.to_bits(),
                book.average_rating.to_bits(),
                "average drifted after {} ratings",
                i + 1
            );
            assert_eq!(decoded.rating_count, book.rating_count);
        }
    }

    #[test]
    fn document_keeps_comments_and_catalog_fields() {
        let mut book = fixtures::rated_book("Echoes of Tomorrow", 4.2, 15);
        book.cover_image = Some("/images/echoes.jpg".to_string());
        book.comments.push(Comment {
            user_id: UserId::new("u1"),
            username: "alice@example.com".to_string(),
            text: "Loved it".to_string(),
            created_at: chrono::DateTime::from_timestamp(1_735_689_600, 500).unwrap(),
        });

        assert_eq!(through_document(&book), book);
    }
}
