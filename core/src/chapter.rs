//! Creator-authored chapters.

use crate::caller::UserId;
use crate::error::EngagementError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// How many chapters the creator dashboard lists as "recent".
pub const RECENT_CHAPTER_LIMIT: usize = 5;

/// Unique identifier of a chapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(Uuid);

impl ChapterId {
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

    /// Parse a caller-supplied identifier; malformed ids are `NotFound`.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::NotFound`] when `raw` is not a valid identifier.
    pub fn parse(raw: &str) -> Result<Self, EngagementError> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| EngagementError::not_found("Chapter", raw))
    }
}

impl Default for ChapterId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChapterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chapter written by a creator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    /// Identity assigned at creation
    pub id: ChapterId,
    /// Author
    pub creator: UserId,
    /// Title, trimmed
    pub title: String,
    /// Rich-text body (opaque)
    pub content: String,
    /// When the chapter was first saved
    pub created_at: DateTime<Utc>,
    /// When the chapter was last saved
    pub updated_at: DateTime<Utc>,
}

impl Chapter {
    /// Create a chapter from a validated draft.
    #[must_use]
    pub fn create(creator: UserId, draft: &ValidDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: ChapterId::new(),
            creator,
            title: draft.title.clone(),
            content: draft.content.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace title and content, bumping `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Forbidden`] if `editor` does not own the chapter.
    pub fn revise(
        &mut self,
        editor: &UserId,
        draft: &ValidDraft,
        now: DateTime<Utc>,
    ) -> Result<(), EngagementError> {
        if &self.creator != editor {
            return Err(EngagementError::forbidden(
                "Chapter belongs to another creator",
            ));
        }
        self.title.clone_from(&draft.title);
        self.content.clone_from(&draft.content);
        self.updated_at = now.max(self.updated_at);
        Ok(())
    }
}

/// Chapter submission as received from a client.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterDraft {
    /// Existing chapter to update; absent to create
    #[serde(default)]
    pub id: Option<String>,
    /// Title
    #[serde(default)]
    pub title: String,
    /// Body
    #[serde(default)]
    pub content: String,
}

/// A draft whose title and content passed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidDraft {
    /// Trimmed, non-empty title
    pub title: String,
    /// Trimmed, non-empty content
    pub content: String,
}

impl ChapterDraft {
    /// Check that title and content are present.
    ///
    /// # Errors
    ///
    /// Returns [`EngagementError::Validation`] when either is blank.
    pub fn validate(&self) -> Result<ValidDraft, EngagementError> {
        let title = self.title.trim();
        let content = self.content.trim();
        if title.is_empty() || content.is_empty() {
            return Err(EngagementError::validation(
                "Title and content are required",
            ));
        }
        Ok(ValidDraft {
            title: title.to_string(),
            content: content.to_string(),
        })
    }
}

/// Creator dashboard counters.
///
/// Reads and likes are not tracked yet and always report zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatorStats {
    /// Chapters authored
    pub chapters: u64,
    /// Total reads across chapters
    pub total_reads: u64,
    /// Total likes across chapters
    pub likes: u64,
}

/// The most recently updated chapters, newest first, at most
/// [`RECENT_CHAPTER_LIMIT`].
#[must_use]
pub fn recent(mut chapters: Vec<Chapter>) -> Vec<Chapter> {
    chapters.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then(a.id.cmp(&b.id)));
    chapters.truncate(RECENT_CHAPTER_LIMIT);
    chapters
}
