//! `PostgreSQL` document stores for Bookshelf.
//!
//! Books, libraries and chapters are each stored as one JSONB document per
//! row, so every field round-trips exactly (floats, counts, ordered comment
//! lists). Books additionally carry a `version` column backing the
//! conditional writes [`BookStore::save`](bookshelf_core::BookStore::save)
//! requires.
//!
//! # Example
//!
//! ```no_run
//! use bookshelf_postgres::{PostgresBookStore, connect, migrate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/bookshelf", 10, Duration::from_secs(30)).await?;
//! migrate(&pool).await?;
//! let books = PostgresBookStore::new(pool);
//! # let _ = books;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use bookshelf_core::StoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

mod books;
mod chapters;
mod libraries;

pub use books::PostgresBookStore;
pub use chapters::PostgresChapterStore;
pub use libraries::PostgresLibraryStore;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if the database is unreachable.
pub async fn connect(
    database_url: &str,
    max_connections: u32,
    connect_timeout: Duration,
) -> Result<PgPool, StoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(connect_timeout)
        .connect(database_url)
        .await
        .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;

    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Create the engagement tables if they do not exist.
///
/// # Errors
///
/// Returns [`StoreError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
    tracing::info!("Database migrations applied");
    Ok(())
}

pub(crate) fn database_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::ColumnDecode { source, .. } => StoreError::Serialization(source.to_string()),
        sqlx::Error::Decode(source) => StoreError::Serialization(source.to_string()),
        other => StoreError::Database(other.to_string()),
    }
}

pub(crate) fn to_column_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version)
        .map_err(|_| StoreError::Serialization(format!("Version {version} out of range")))
}

pub(crate) fn from_column_version(version: i64) -> Result<u64, StoreError> {
    u64::try_from(version)
        .map_err(|_| StoreError::Serialization(format!("Negative version {version}")))
}
