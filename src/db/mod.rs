use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{CanonicalMovie, HistoryEntry, User};

pub mod postgres;
pub mod redis;

pub use postgres::{create_pool, PgMovieStore, PgUserStore};
pub use redis::{create_redis_client, Cache, CacheBackend, CacheKey, RedisBackend};

/// Durable store for user aggregates, keyed by external identity subject id.
///
/// Implementations must make `commit_recommendation` atomic per user: the
/// history insert and the optional quota bump happen as one logical unit, so
/// a failure partway never leaves the counter and the history diverged.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn fetch(&self, subject_id: &str) -> AppResult<Option<User>>;

    /// Last-writer-wins full-document upsert.
    async fn upsert(&self, user: &User) -> AppResult<()>;

    /// Inserts the entry into the user's history only if no existing entry
    /// shares its movie id, rolling and bumping the daily quota counter when
    /// `count_toward_quota` is set and the entry is new.
    ///
    /// Returns whether a new entry was inserted. Two concurrent calls with
    /// the same new movie id must resolve to exactly one `true`.
    async fn commit_recommendation(
        &self,
        subject_id: &str,
        entry: HistoryEntry,
        count_toward_quota: bool,
    ) -> AppResult<bool>;
}

/// Durable store for canonical movie records.
///
/// Records are created on first resolution and never deleted; concurrent
/// first-resolution of the same movie degrades to a harmless duplicate
/// create attempt rejected by the uniqueness constraint.
#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn fetch(&self, tmdb_id: i64) -> AppResult<Option<CanonicalMovie>>;

    /// Insert-if-absent keyed by the external id; an existing record wins.
    async fn insert_if_absent(&self, movie: &CanonicalMovie) -> AppResult<()>;

    /// Case-insensitive exact-title lookup.
    async fn find_by_title(&self, title: &str) -> AppResult<Vec<CanonicalMovie>>;
}
