/// External provider abstractions
///
/// This module provides a pluggable seam for the two external services the
/// core consumes: the movie metadata search provider and the generative
/// suggestion provider. Provider-shaped payloads are mapped into internal
/// shapes once, at this boundary, so the rest of the system never sees
/// provider-specific field names.
use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{TmdbMovie, TmdbMovieDetails, TmdbPaged};

pub mod openai;
pub mod tmdb;

/// Trending window accepted by the metadata provider
pub const TRENDING_DAY: &str = "day";
pub const TRENDING_WEEK: &str = "week";

/// Movie metadata search/lookup provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    /// Text search returning a ranked candidate list.
    async fn search(&self, query: &str, page: u32) -> AppResult<TmdbPaged<TmdbMovie>>;

    /// Get-by-id returning the full detail record including credits.
    async fn details(&self, tmdb_id: i64) -> AppResult<TmdbMovieDetails>;

    /// Discover-by-filter: ranked list for an optional genre, vote-count
    /// floor applied, sorted by popularity.
    async fn discover_by_genre(
        &self,
        genre_id: Option<i64>,
        page: u32,
    ) -> AppResult<TmdbPaged<TmdbMovie>>;

    /// Trending titles over the given window ("day" or "week").
    async fn trending(&self, window: &str) -> AppResult<TmdbPaged<TmdbMovie>>;
}

/// One structured-suggestion request to the generative provider.
#[derive(Debug, Clone)]
pub struct SuggestionRequest {
    pub system: String,
    pub prompt: String,
    /// Randomness, escalated per attempt to diversify repeated failures
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Generative text provider producing one fuzzy movie suggestion per call.
///
/// The reply is free text expected to parse as a single JSON object; the
/// orchestrator owns the defensive parsing, this trait only moves text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SuggestionProvider: Send + Sync {
    async fn suggest(&self, request: &SuggestionRequest) -> AppResult<String>;
}
