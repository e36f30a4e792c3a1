//! Chapter authoring for creators.

use bookshelf_core::caller::authenticated;
use bookshelf_core::chapter::recent;
use bookshelf_core::environment::Clock;
use bookshelf_core::{
    Caller, Chapter, ChapterDraft, ChapterId, ChapterStore, CreatorStats, EngagementError,
};
use std::sync::Arc;
use tracing::info;

/// Create, update and list chapters.
#[derive(Clone)]
pub struct ChapterService {
    chapters: Arc<dyn ChapterStore>,
    clock: Arc<dyn Clock>,
}

impl ChapterService {
    /// Create a service over the given store.
    #[must_use]
    pub fn new(chapters: Arc<dyn ChapterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { chapters, clock }
    }

    /// Create a chapter, or update one the caller owns when `draft.id` is set.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Forbidden`]: caller is a reader, or does not own the chapter
    /// - [`EngagementError::Validation`]: blank title or content
    /// - [`EngagementError::NotFound`]: `draft.id` names no chapter
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn save(
        &self,
        caller: Option<&Caller>,
        draft: ChapterDraft,
    ) -> Result<Chapter, EngagementError> {
        let caller = authenticated(caller)?;
        caller.require_author()?;
        let valid = draft.validate()?;
        let now = self.clock.now();

        let chapter = match draft.id.as_deref().map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw_id) => {
                let id = ChapterId::parse(raw_id)?;
                let mut chapter = self
                    .chapters
                    .load(id)
                    .await?
                    .ok_or_else(|| EngagementError::not_found("Chapter", raw_id))?;
                chapter.revise(&caller.user_id, &valid, now)?;
                chapter
            }
            None => Chapter::create(caller.user_id.clone(), &valid, now),
        };

        self.chapters.save(chapter.clone()).await?;
        info!(
            chapter_id = %chapter.id,
            user_id = %caller.user_id,
            "Chapter saved"
        );
        Ok(chapter)
    }

    /// Load a chapter. No caller needed.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::NotFound`]: unknown or malformed id
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn get(&self, chapter_id: &str) -> Result<Chapter, EngagementError> {
        let id = ChapterId::parse(chapter_id)?;
        self.chapters
            .load(id)
            .await?
            .ok_or_else(|| EngagementError::not_found("Chapter", chapter_id))
    }

    /// Dashboard counters for the caller.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Forbidden`]: caller is a reader
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn stats(&self, caller: Option<&Caller>) -> Result<CreatorStats, EngagementError> {
        let caller = authenticated(caller)?;
        caller.require_author()?;
        let chapters = self.chapters.list_by_creator(caller.user_id.clone()).await?;
        Ok(CreatorStats {
            chapters: chapters.len() as u64,
            ..CreatorStats::default()
        })
    }

    /// The caller's most recently updated chapters, newest first.
    ///
    /// # Errors
    ///
    /// - [`EngagementError::AuthenticationRequired`]: no caller
    /// - [`EngagementError::Forbidden`]: caller is a reader
    /// - [`EngagementError::Persistence`]: store failure
    pub async fn recent(&self, caller: Option<&Caller>) -> Result<Vec<Chapter>, EngagementError> {
        let caller = authenticated(caller)?;
        caller.require_author()?;
        let chapters = self.chapters.list_by_creator(caller.user_id.clone()).await?;
        Ok(recent(chapters))
    }
}
