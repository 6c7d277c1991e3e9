/// TMDB metadata provider
///
/// Implements text search, get-by-id (with credits appended), discover-by-
/// genre, and trending lookups against a TMDB-compatible API. Payloads are
/// deserialized into the `Tmdb*` types and converted to internal shapes by
/// the callers at the cache/store boundary.
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;

use crate::{
    error::{AppError, AppResult},
    models::{TmdbMovie, TmdbMovieDetails, TmdbPaged},
    services::providers::MetadataProvider,
};

/// Metadata calls are in the 10-15s class
const REQUEST_TIMEOUT_SECS: u64 = 12;

/// Vote-count floor applied to discover queries to keep obscure entries out
const DISCOVER_MIN_VOTES: u32 = 200;

#[derive(Clone)]
pub struct TmdbProvider {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
}

impl TmdbProvider {
    pub fn new(api_key: String, api_url: String) -> Self {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();

        Self {
            http_client,
            api_key,
            api_url,
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> AppResult<T> {
        let url = format!("{}{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external_api(
                status,
                format!("TMDB API returned status {}: {}", status, body),
            ));
        }

        let payload = response.json().await.map_err(|e| AppError::ExternalApi {
            status: None,
            message: format!("Failed to parse TMDB response: {}", e),
        })?;

        Ok(payload)
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    async fn search(&self, query: &str, page: u32) -> AppResult<TmdbPaged<TmdbMovie>> {
        if query.trim().is_empty() {
            return Err(AppError::InvalidInput(
                "Search query cannot be empty".to_string(),
            ));
        }

        let page = page.to_string();
        let results: TmdbPaged<TmdbMovie> = self
            .get_json(
                "/search/movie",
                &[("query", query), ("page", &page), ("include_adult", "false")],
            )
            .await?;

        tracing::info!(
            query = %query,
            results = results.results.len(),
            provider = "tmdb",
            "Title search completed"
        );

        Ok(results)
    }

    async fn details(&self, tmdb_id: i64) -> AppResult<TmdbMovieDetails> {
        let details: TmdbMovieDetails = self
            .get_json(
                &format!("/movie/{}", tmdb_id),
                &[("append_to_response", "credits")],
            )
            .await?;

        tracing::info!(tmdb_id = tmdb_id, provider = "tmdb", "Details fetched");

        Ok(details)
    }

    async fn discover_by_genre(
        &self,
        genre_id: Option<i64>,
        page: u32,
    ) -> AppResult<TmdbPaged<TmdbMovie>> {
        let page = page.to_string();
        let min_votes = DISCOVER_MIN_VOTES.to_string();
        let mut query = vec![
            ("sort_by", "popularity.desc"),
            ("vote_count.gte", min_votes.as_str()),
            ("page", page.as_str()),
        ];

        let genre;
        if let Some(id) = genre_id {
            genre = id.to_string();
            query.push(("with_genres", genre.as_str()));
        }

        let results: TmdbPaged<TmdbMovie> = self.get_json("/discover/movie", &query).await?;

        tracing::info!(
            genre_id = ?genre_id,
            results = results.results.len(),
            provider = "tmdb",
            "Discover completed"
        );

        Ok(results)
    }

    async fn trending(&self, window: &str) -> AppResult<TmdbPaged<TmdbMovie>> {
        let results: TmdbPaged<TmdbMovie> = self
            .get_json(&format!("/trending/movie/{}", window), &[])
            .await?;

        tracing::info!(
            window = %window,
            results = results.results.len(),
            provider = "tmdb",
            "Trending fetched"
        );

        Ok(results)
    }
}
