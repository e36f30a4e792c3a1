//! Resolution of stored asset references into fetchable URLs.

use bookshelf_core::Book;

/// Turns relative cover and document paths into absolute URLs.
///
/// References that already are `http(s)` URLs pass through unchanged.
#[derive(Clone, Debug)]
pub struct AssetResolver {
    base_url: String,
}

impl AssetResolver {
    /// Create a resolver rooted at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Resolve one reference.
    #[must_use]
    pub fn resolve(&self, reference: &str) -> String {
        let reference = reference.trim();
        if reference.starts_with("http://") || reference.starts_with("https://") {
            return reference.to_string();
        }
        format!("{}/{}", self.base_url, reference.trim_start_matches('/'))
    }

    /// Resolve the cover image and document of a book. Empty references are dropped.
    #[must_use]
    pub fn resolve_book(&self, mut book: Book) -> Book {
        book.cover_image = self.resolve_optional(book.cover_image.as_deref());
        book.document = self.resolve_optional(book.document.as_deref());
        book
    }

    fn resolve_optional(&self, reference: Option<&str>) -> Option<String> {
        reference
            .filter(|r| !r.trim().is_empty())
            .map(|r| self.resolve(r))
    }
}
