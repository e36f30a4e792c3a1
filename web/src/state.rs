//! Application state for Axum handlers.

use crate::assets::AssetResolver;
use crate::auth::JwtVerifier;
use axum::extract::FromRef;
use bookshelf_runtime::{ChapterService, EngagementService, LibraryService};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Ratings, comments and catalog reads
    pub engagement: EngagementService,
    /// Personal reading lists
    pub library: LibraryService,
    /// Creator chapters
    pub chapters: ChapterService,
    /// Bearer token verification
    pub verifier: Arc<JwtVerifier>,
    /// Cover and document URL resolution
    pub assets: AssetResolver,
    /// Prometheus exposition, `None` when metrics are disabled
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create a new application state with metrics disabled.
    #[must_use]
    pub fn new(
        engagement: EngagementService,
        library: LibraryService,
        chapters: ChapterService,
        verifier: JwtVerifier,
        assets: AssetResolver,
    ) -> Self {
        Self {
            engagement,
            library,
            chapters,
            verifier: Arc::new(verifier),
            assets,
            metrics: None,
        }
    }

    /// Expose the given recorder at `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

// Lets the caller extractor pull the verifier out of the state
impl FromRef<AppState> for Arc<JwtVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}
