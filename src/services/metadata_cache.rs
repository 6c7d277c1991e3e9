use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    cached,
    db::{Cache, CacheKey, MovieStore},
    error::{AppError, AppResult},
    models::{genre_id, CanonicalMovie, TmdbMovie, TmdbMovieDetails, TmdbPaged},
    services::{providers::MetadataProvider, retry::RetryPolicy},
};

/// Batch resolution chunk size, kept small to respect upstream rate limits
const BATCH_SIZE: usize = 5;

/// Pause between batch chunks
const BATCH_PAUSE: Duration = Duration::from_millis(250);

/// Where a batch-resolved movie came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Canonical movie store (never expires, preferred)
    Store,
    /// Cache entry for the provider payload
    Cache,
    /// Fresh provider call
    Provider,
}

/// One successfully resolved batch item, tagged with its provenance.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedMovie {
    pub movie: CanonicalMovie,
    pub provenance: Provenance,
}

/// Outcome of a batch resolution: individual failures are reported per item
/// rather than aborting the whole batch.
#[derive(Debug, Default, Serialize)]
pub struct BatchResolution {
    pub resolved: Vec<ResolvedMovie>,
    pub failures: Vec<BatchFailure>,
}

#[derive(Debug, Serialize)]
pub struct BatchFailure {
    pub tmdb_id: i64,
    pub error: String,
}

/// Cache-aside wrapper around the external movie-metadata provider.
///
/// Owns key construction, TTL policy (via [`CacheKey::ttl`]), and the shared
/// retry policy for transient provider failures. The canonical movie store is
/// consulted before any provider call for by-id lookups, since canonical
/// records never expire. This component is the sole writer of canonical
/// movie records.
#[derive(Clone)]
pub struct MetadataCache {
    cache: Cache,
    provider: Arc<dyn MetadataProvider>,
    movies: Arc<dyn MovieStore>,
    retry: RetryPolicy,
}

impl MetadataCache {
    pub fn new(
        cache: Cache,
        provider: Arc<dyn MetadataProvider>,
        movies: Arc<dyn MovieStore>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            cache,
            provider,
            movies,
            retry,
        }
    }

    /// Text search with cache-aside semantics; a hit is returned unchanged.
    pub async fn search(&self, query: &str, page: u32) -> AppResult<TmdbPaged<TmdbMovie>> {
        let key = CacheKey::Search {
            query: query.to_string(),
            page,
        };
        cached!(self.cache, key, async {
            let results = self
                .retry
                .run("tmdb_search", || self.provider.search(query, page))
                .await?;
            self.cache.incr_daily("tmdb").await;
            Ok::<_, AppError>(results)
        })
    }

    /// Raw detail payload by external id, cache-aside.
    pub async fn get_details(&self, tmdb_id: i64) -> AppResult<TmdbMovieDetails> {
        let key = CacheKey::Details(tmdb_id);
        cached!(self.cache, key, async {
            let details = self
                .retry
                .run("tmdb_details", || self.provider.details(tmdb_id))
                .await?;
            self.cache.incr_daily("tmdb").await;
            Ok::<_, AppError>(details)
        })
    }

    /// Popular titles, optionally restricted to one genre name.
    pub async fn get_popular(
        &self,
        genre: Option<&str>,
        page: u32,
    ) -> AppResult<TmdbPaged<TmdbMovie>> {
        let genre_filter = genre.and_then(genre_id);
        let key = CacheKey::Popular {
            genre: genre.map(|g| g.to_lowercase()),
            page,
        };
        cached!(self.cache, key, async {
            let results = self
                .retry
                .run("tmdb_discover", || {
                    self.provider.discover_by_genre(genre_filter, page)
                })
                .await?;
            self.cache.incr_daily("tmdb").await;
            Ok::<_, AppError>(results)
        })
    }

    /// Trending titles over the given window.
    pub async fn get_trending(&self, window: &str) -> AppResult<TmdbPaged<TmdbMovie>> {
        let key = CacheKey::Trending(window.to_string());
        cached!(self.cache, key, async {
            let results = self
                .retry
                .run("tmdb_trending", || self.provider.trending(window))
                .await?;
            self.cache.incr_daily("tmdb").await;
            Ok::<_, AppError>(results)
        })
    }

    /// Canonical record by external id.
    ///
    /// The durable store is consulted first - a hit there is preferred over
    /// even a fresh provider call. Only on a store miss does this fall
    /// through to `get_details` and persist the result as canonical.
    pub async fn get_or_fetch_details(&self, tmdb_id: i64) -> AppResult<CanonicalMovie> {
        Ok(self.resolve_one(tmdb_id).await?.movie)
    }

    async fn resolve_one(&self, tmdb_id: i64) -> AppResult<ResolvedMovie> {
        if let Some(movie) = self.movies.fetch(tmdb_id).await? {
            return Ok(ResolvedMovie {
                movie,
                provenance: Provenance::Store,
            });
        }

        let was_cached = self.cache.exists(&CacheKey::Details(tmdb_id)).await;
        let details = self.get_details(tmdb_id).await?;
        let movie = CanonicalMovie::from(details);
        self.movies.insert_if_absent(&movie).await?;

        Ok(ResolvedMovie {
            movie,
            provenance: if was_cached {
                Provenance::Cache
            } else {
                Provenance::Provider
            },
        })
    }

    /// Resolves a suggested (title, year) to a canonical record.
    ///
    /// The canonical store is tried by exact title first, then provider
    /// search. Among search candidates the one whose release year matches
    /// the suggested year wins; without a year the top-ranked result is
    /// taken. `Ok(None)` means nothing matched (not an error).
    pub async fn resolve_title(
        &self,
        title: &str,
        year: Option<i32>,
    ) -> AppResult<Option<CanonicalMovie>> {
        let known = self.movies.find_by_title(title).await?;
        if let Some(movie) = known
            .iter()
            .find(|m| year.is_none() || m.year() == year)
            .or(known.first())
        {
            return Ok(Some(movie.clone()));
        }

        let results = self.search(title, 1).await?;
        let candidate = match year {
            Some(y) => results
                .results
                .iter()
                .find(|m| m.release_year() == Some(y))
                .or(results.results.first()),
            None => results.results.first(),
        };

        match candidate {
            Some(listing) => Ok(Some(self.get_or_fetch_details(listing.id).await?)),
            None => Ok(None),
        }
    }

    /// Resolves many external ids, fetching uncached ones in small batches
    /// with a pause in between. Failures are collected per item.
    pub async fn resolve_batch(&self, tmdb_ids: &[i64]) -> BatchResolution {
        let mut outcome = BatchResolution::default();

        for (index, chunk) in tmdb_ids.chunks(BATCH_SIZE).enumerate() {
            if index > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }

            let mut tasks = Vec::with_capacity(chunk.len());
            for &tmdb_id in chunk {
                let this = self.clone();
                tasks.push((
                    tmdb_id,
                    tokio::spawn(async move { this.resolve_one(tmdb_id).await }),
                ));
            }

            for (tmdb_id, task) in tasks {
                match task.await {
                    Ok(Ok(resolved)) => outcome.resolved.push(resolved),
                    Ok(Err(e)) => {
                        tracing::warn!(tmdb_id = tmdb_id, error = %e, "Batch item resolution failed");
                        outcome.failures.push(BatchFailure {
                            tmdb_id,
                            error: e.to_string(),
                        });
                    }
                    Err(e) => {
                        outcome.failures.push(BatchFailure {
                            tmdb_id,
                            error: AppError::Internal(e.to_string()).to_string(),
                        });
                    }
                }
            }
        }

        if !outcome.failures.is_empty() {
            tracing::warn!(
                resolved = outcome.resolved.len(),
                failed = outcome.failures.len(),
                "Partial batch resolution"
            );
        }

        outcome
    }

    /// Drops the cached detail payload for one movie.
    pub async fn invalidate_movie(&self, tmdb_id: i64) {
        self.cache.delete(&CacheKey::Details(tmdb_id)).await;
    }

    /// Pattern-based invalidation of a whole key family, used when canonical
    /// records are known to be stale.
    pub async fn invalidate_prefix(&self, prefix: &str) -> u64 {
        self.cache.delete_prefix(prefix).await
    }
}
