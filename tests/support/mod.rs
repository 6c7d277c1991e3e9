//! In-memory fakes for exercising full flows without Postgres, Redis, or
//! live providers.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use tokio::sync::Mutex;

use reelpick_api::{
    db::{CacheBackend, MovieStore, UserStore},
    error::{AppError, AppResult},
    models::{CanonicalMovie, HistoryEntry, TmdbMovie, TmdbMovieDetails, TmdbPaged, User},
    services::{IdentityClaims, IdentityVerifier, MetadataProvider, SuggestionProvider, SuggestionRequest},
};

/// User store fake with the same commit atomicity contract as the Postgres
/// implementation: one async mutex held across the read-modify-write.
#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<HashMap<String, User>>,
}

impl MemoryUserStore {
    pub async fn seed(&self, user: User) {
        self.users
            .lock()
            .await
            .insert(user.subject_id.clone(), user);
    }

    pub async fn get(&self, subject_id: &str) -> Option<User> {
        self.users.lock().await.get(subject_id).cloned()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn fetch(&self, subject_id: &str) -> AppResult<Option<User>> {
        Ok(self.users.lock().await.get(subject_id).cloned())
    }

    async fn upsert(&self, user: &User) -> AppResult<()> {
        self.users
            .lock()
            .await
            .insert(user.subject_id.clone(), user.clone());
        Ok(())
    }

    async fn commit_recommendation(
        &self,
        subject_id: &str,
        entry: HistoryEntry,
        count_toward_quota: bool,
    ) -> AppResult<bool> {
        let mut users = self.users.lock().await;
        let user = users
            .get_mut(subject_id)
            .ok_or_else(|| AppError::NotFound(format!("User {}", subject_id)))?;

        let inserted = user.record_recommendation(entry);
        if inserted && count_toward_quota {
            user.daily_quota.roll(chrono::Utc::now().date_naive());
            user.daily_quota.count += 1;
        }
        Ok(inserted)
    }
}

#[derive(Default)]
pub struct MemoryMovieStore {
    movies: StdMutex<HashMap<i64, CanonicalMovie>>,
}

#[async_trait]
impl MovieStore for MemoryMovieStore {
    async fn fetch(&self, tmdb_id: i64) -> AppResult<Option<CanonicalMovie>> {
        Ok(self.movies.lock().unwrap().get(&tmdb_id).cloned())
    }

    async fn insert_if_absent(&self, movie: &CanonicalMovie) -> AppResult<()> {
        self.movies
            .lock()
            .unwrap()
            .entry(movie.tmdb_id)
            .or_insert_with(|| movie.clone());
        Ok(())
    }

    async fn find_by_title(&self, title: &str) -> AppResult<Vec<CanonicalMovie>> {
        Ok(self
            .movies
            .lock()
            .unwrap()
            .values()
            .filter(|m| m.title.eq_ignore_ascii_case(title))
            .cloned()
            .collect())
    }
}

/// Working in-memory cache backend (TTL ignored).
#[derive(Default)]
pub struct MemoryCacheBackend {
    entries: StdMutex<HashMap<String, String>>,
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set_ex(&self, key: &str, value: &str, _ttl_secs: u64) -> AppResult<()> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> AppResult<u64> {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok((before - entries.len()) as u64)
    }

    async fn exists(&self, key: &str) -> AppResult<bool> {
        Ok(self.entries.lock().unwrap().contains_key(key))
    }

    async fn incr_ex(&self, _key: &str, _ttl_secs: u64) -> AppResult<i64> {
        Ok(1)
    }
}

/// Cache backend where every operation fails, for degraded-mode flows.
pub struct FailingCacheBackend;

#[async_trait]
impl CacheBackend for FailingCacheBackend {
    async fn get(&self, _key: &str) -> AppResult<Option<String>> {
        Err(AppError::Internal("cache down".to_string()))
    }

    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> AppResult<()> {
        Err(AppError::Internal("cache down".to_string()))
    }

    async fn delete(&self, _key: &str) -> AppResult<()> {
        Err(AppError::Internal("cache down".to_string()))
    }

    async fn delete_prefix(&self, _prefix: &str) -> AppResult<u64> {
        Err(AppError::Internal("cache down".to_string()))
    }

    async fn exists(&self, _key: &str) -> AppResult<bool> {
        Err(AppError::Internal("cache down".to_string()))
    }

    async fn incr_ex(&self, _key: &str, _ttl_secs: u64) -> AppResult<i64> {
        Err(AppError::Internal("cache down".to_string()))
    }
}

/// Suggestion provider replaying a fixed script of replies, recording the
/// temperature of every request it sees.
#[derive(Default)]
pub struct ScriptedSuggestionProvider {
    replies: StdMutex<Vec<Result<String, AppError>>>,
    pub temperatures: StdMutex<Vec<f32>>,
}

impl ScriptedSuggestionProvider {
    pub fn new(replies: Vec<Result<String, AppError>>) -> Self {
        let mut replies = replies;
        // Popped from the back
        replies.reverse();
        Self {
            replies: StdMutex::new(replies),
            temperatures: StdMutex::new(Vec::new()),
        }
    }

    /// Script that replies with the same text forever.
    pub fn repeating(reply: &str) -> Self {
        let provider = Self::default();
        provider
            .replies
            .lock()
            .unwrap()
            .push(Ok(format!("__repeat__{reply}")));
        provider
    }

    pub fn calls(&self) -> usize {
        self.temperatures.lock().unwrap().len()
    }
}

#[async_trait]
impl SuggestionProvider for ScriptedSuggestionProvider {
    async fn suggest(&self, request: &SuggestionRequest) -> AppResult<String> {
        self.temperatures
            .lock()
            .unwrap()
            .push(request.temperature);

        let mut replies = self.replies.lock().unwrap();
        if let Some(Ok(text)) = replies.last() {
            if let Some(repeated) = text.strip_prefix("__repeat__") {
                return Ok(repeated.to_string());
            }
        }
        replies
            .pop()
            .unwrap_or_else(|| Err(AppError::Internal("script exhausted".to_string())))
    }
}

/// Fixed movie catalogue behind the provider trait, with call counters.
#[derive(Default)]
pub struct StubMetadataProvider {
    catalogue: Vec<TmdbMovieDetails>,
    pub search_calls: AtomicU32,
    pub details_calls: AtomicU32,
}

impl StubMetadataProvider {
    pub fn with_catalogue(catalogue: Vec<TmdbMovieDetails>) -> Self {
        Self {
            catalogue,
            ..Self::default()
        }
    }

    fn listing(details: &TmdbMovieDetails) -> TmdbMovie {
        TmdbMovie {
            id: details.id,
            title: details.title.clone(),
            overview: details.overview.clone(),
            release_date: details.release_date.clone(),
            genre_ids: details.genres.iter().map(|g| g.id).collect(),
            vote_average: details.vote_average,
            vote_count: details.vote_count,
            popularity: details.popularity,
            poster_path: details.poster_path.clone(),
            backdrop_path: details.backdrop_path.clone(),
        }
    }

    fn paged(results: Vec<TmdbMovie>) -> TmdbPaged<TmdbMovie> {
        TmdbPaged {
            page: 1,
            total_pages: 1,
            total_results: results.len() as u32,
            results,
        }
    }
}

#[async_trait]
impl MetadataProvider for StubMetadataProvider {
    async fn search(&self, query: &str, _page: u32) -> AppResult<TmdbPaged<TmdbMovie>> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let results = self
            .catalogue
            .iter()
            .filter(|m| m.title.to_lowercase().contains(&query.to_lowercase()))
            .map(Self::listing)
            .collect();
        Ok(Self::paged(results))
    }

    async fn details(&self, tmdb_id: i64) -> AppResult<TmdbMovieDetails> {
        self.details_calls.fetch_add(1, Ordering::SeqCst);
        self.catalogue
            .iter()
            .find(|m| m.id == tmdb_id)
            .cloned()
            .ok_or_else(|| AppError::external_api(404, "movie not found"))
    }

    async fn discover_by_genre(
        &self,
        genre_id: Option<i64>,
        _page: u32,
    ) -> AppResult<TmdbPaged<TmdbMovie>> {
        let results = self
            .catalogue
            .iter()
            .filter(|m| match genre_id {
                Some(id) => m.genres.iter().any(|g| g.id == id),
                None => true,
            })
            .map(Self::listing)
            .collect();
        Ok(Self::paged(results))
    }

    async fn trending(&self, _window: &str) -> AppResult<TmdbPaged<TmdbMovie>> {
        Ok(Self::paged(
            self.catalogue.iter().map(Self::listing).collect(),
        ))
    }
}

/// Verifier accepting one fixed token.
pub struct StaticVerifier {
    pub token: String,
    pub claims: IdentityClaims,
}

impl StaticVerifier {
    pub fn new(token: &str, subject_id: &str, email: &str) -> Self {
        Self {
            token: token.to_string(),
            claims: IdentityClaims {
                subject_id: subject_id.to_string(),
                email: email.to_string(),
                name: Some("Test User".to_string()),
                picture: None,
            },
        }
    }
}

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> AppResult<IdentityClaims> {
        if token == self.token {
            Ok(self.claims.clone())
        } else {
            Err(AppError::Unauthorized("Invalid identity token".to_string()))
        }
    }
}

/// Builds a detail record for the stub catalogue.
pub fn movie_details(id: i64, title: &str, year: i32, genres: &[(i64, &str)]) -> TmdbMovieDetails {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "title": title,
        "overview": "Synopsis.",
        "release_date": format!("{year}-06-01"),
        "genres": genres
            .iter()
            .map(|(gid, name)| serde_json::json!({"id": gid, "name": name}))
            .collect::<Vec<_>>(),
        "runtime": 120,
        "vote_average": 7.8,
        "vote_count": 12000,
        "popularity": 55.0,
        "poster_path": "/poster.jpg"
    }))
    .expect("valid detail fixture")
}

/// One well-formed provider reply for the given movie.
pub fn suggestion_json(title: &str, year: i32) -> String {
    format!(
        r#"{{"title": "{title}", "year": {year}, "reason": "You will love this one.", "genre": "Drama", "rating": 7.8}}"#
    )
}
