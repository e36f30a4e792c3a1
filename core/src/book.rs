//! Persistent book records.
//!
//! A [`Book`] is stored as a single document: catalog attributes, the rating
//! aggregate, the embedded comment thread, and a version used for optimistic
//! concurrency. Fields missing from a stored document take explicit defaults
//! (`0.0`/`0` for the aggregate, empty thread) instead of surfacing as absent.

use crate::comment::Comment;
use crate::error::EngagementError;
use crate::rating::RatingAggregate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix of the realtime channel key for a book.
pub const CHANNEL_PREFIX: &str = "bookUpdated:";

/// Unique, immutable identifier of a book.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookId(Uuid);

impl BookId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse a caller-supplied identifier.
    ///
    /// A malformed identifier cannot name an existing book, so it is reported
    /// as `NotFound` rather than as a validation failure.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::NotFound`] when `raw` is not a valid identifier.
    pub fn parse(raw: &str) -> Result<Self, EngagementError> {
        raw.parse()
            .map_err(|_| EngagementError::not_found("Book", raw))
    }

    /// Realtime channel key for this book (`bookUpdated:<id>`).
    #[must_use]
    pub fn channel(&self) -> String {
        format!("{CHANNEL_PREFIX}{}", self.0)
    }
}

impl Default for BookId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BookId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A book in the catalog, with its engagement state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    /// Identity assigned at creation
    pub id: BookId,
    /// Title
    pub title: String,
    /// Author name
    #[serde(default)]
    pub author: String,
    /// Genre label
    #[serde(default)]
    pub genre: String,
    /// Descriptive synopsis
    #[serde(default)]
    pub synopsis: String,
    /// Stored cover image reference (relative path or absolute URL)
    #[serde(default)]
    pub cover_image: Option<String>,
    /// Stored downloadable document reference
    #[serde(default)]
    pub document: Option<String>,
    /// Mean of all ratings so far
    #[serde(default)]
    pub average_rating: f64,
    /// Number of ratings so far
    #[serde(default)]
    pub rating_count: u64,
    /// Comment thread, oldest first
    #[serde(default)]
    pub comments: Vec<Comment>,
    /// Optimistic concurrency version, owned by the store
    #[serde(default)]
    pub version: u64,
}

impl Book {
    /// Build a new, not-yet-stored book from a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Validation`] when the title is blank or the
    /// initial aggregate violates the rating invariant.
    pub fn create(entry: NewBook) -> Result<Self, EngagementError> {
        let title = entry.title.trim();
        if title.is_empty() {
            return Err(EngagementError::validation("Title is required"));
        }

        let aggregate = RatingAggregate::new(entry.average_rating, entry.rating_count);
        aggregate.validate()?;

        Ok(Self {
            id: BookId::new(),
            title: title.to_string(),
            author: entry.author,
            genre: entry.genre,
            synopsis: entry.synopsis,
            cover_image: entry.cover_image,
            document: entry.document,
            average_rating: aggregate.average_rating,
            rating_count: aggregate.rating_count,
            comments: Vec::new(),
            version: 0,
        })
    }

    /// Current rating aggregate.
    #[must_use]
    pub const fn rating(&self) -> RatingAggregate {
        RatingAggregate::new(self.average_rating, self.rating_count)
    }

    /// Replace the rating aggregate.
    pub const fn set_rating(&mut self, aggregate: RatingAggregate) {
        self.average_rating = aggregate.average_rating;
        self.rating_count = aggregate.rating_count;
    }

    /// Realtime channel key for this book.
    #[must_use]
    pub fn channel(&self) -> String {
        self.id.channel()
    }
}

/// Catalog entry used to create a book.
///
/// Accepts the field names of the legacy seed data (`img`, `pdfUrl`, `rating`)
/// as aliases.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    /// Title (required)
    pub title: String,
    /// Author name
    #[serde(default)]
    pub author: String,
    /// Genre label
    #[serde(default)]
    pub genre: String,
    /// Descriptive synopsis
    #[serde(default)]
    pub synopsis: String,
    /// Cover image reference
    #[serde(default, alias = "img")]
    pub cover_image: Option<String>,
    /// Downloadable document reference
    #[serde(default, alias = "pdfUrl")]
    pub document: Option<String>,
    /// Initial average rating
    #[serde(default, alias = "rating")]
    pub average_rating: f64,
    /// Initial rating count
    #[serde(default)]
    pub rating_count: u64,
}

impl NewBook {
    /// Catalog entry with only a title.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the author.
    #[must_use]
    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)] // Test code
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_books_start_with_empty_aggregate() {
        let book = Book::create(NewBook::titled("Echoes of Tomorrow").by("Michael Storm")).unwrap();
        assert_eq!(book.rating(), RatingAggregate::default());
        assert!(book.comments.is_empty());
        assert_eq!(book.author, "Michael Storm");
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(matches!(
            Book::create(NewBook::titled("   ")),
            Err(EngagementError::Validation(_))
        ));
    }

    #[test]
    fn seeded_aggregate_must_be_consistent() {
        let mut entry = NewBook::titled("Whispers in the Dark");
        entry.average_rating = 4.8;
        entry.rating_count = 20;
        assert_eq!(Book::create(entry.clone()).unwrap().rating_count, 20);

        entry.rating_count = 0;
        assert!(Book::create(entry).is_err());
    }

    #[test]
    fn missing_fields_take_defaults() {
        let id = BookId::new();
        let book: Book = serde_json::from_value(json!({ "id": id, "title": "Sparse" })).unwrap();

        assert_eq!(book.average_rating, 0.0);
        assert_eq!(book.rating_count, 0);
        assert!(book.comments.is_empty());
        assert_eq!(book.cover_image, None);
    }

    #[test]
    fn legacy_seed_fields_are_accepted() {
        let entry: NewBook = serde_json::from_value(json!({
            "title": "The Silent Heir",
            "img": "/images/bg_dark.jpg",
            "pdfUrl": "/uploads/ENOCH.pdf",
            "rating": 4.5,
            "ratingCount": 10
        }))
        .unwrap();

        assert_eq!(entry.cover_image.as_deref(), Some("/images/bg_dark.jpg"));
        assert_eq!(entry.document.as_deref(), Some("/uploads/ENOCH.pdf"));
        assert_eq!(entry.average_rating, 4.5);
    }

    #[test]
    fn malformed_ids_are_not_found() {
        assert!(matches!(
            BookId::parse("not-a-book"),
            Err(EngagementError::NotFound { resource: "Book", .. })
        ));
        let id = BookId::new();
        assert_eq!(BookId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn channel_key() {
        let id = BookId::new();
        assert_eq!(id.channel(), format!("bookUpdated:{id}"));
    }
}
