use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};

use crate::db::{MovieStore, UserStore};
use crate::error::{AppError, AppResult};
use crate::models::{CanonicalMovie, HistoryEntry, User};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// User aggregates stored as one JSONB document per subject.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(doc: serde_json::Value) -> AppResult<User> {
        serde_json::from_value(doc)
            .map_err(|e| AppError::Internal(format!("User document decode error: {}", e)))
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn fetch(&self, subject_id: &str) -> AppResult<Option<User>> {
        let row = sqlx::query("SELECT doc FROM users WHERE subject_id = $1")
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::decode(row.try_get("doc")?)?)),
            None => Ok(None),
        }
    }

    async fn upsert(&self, user: &User) -> AppResult<()> {
        let doc = serde_json::to_value(user)
            .map_err(|e| AppError::Internal(format!("User document encode error: {}", e)))?;

        sqlx::query(
            "INSERT INTO users (subject_id, doc) VALUES ($1, $2) \
             ON CONFLICT (subject_id) DO UPDATE SET doc = EXCLUDED.doc, updated_at = now()",
        )
        .bind(&user.subject_id)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn commit_recommendation(
        &self,
        subject_id: &str,
        entry: HistoryEntry,
        count_toward_quota: bool,
    ) -> AppResult<bool> {
        // Row lock serializes concurrent commits for the same user, so the
        // insert-if-absent check and the quota bump act as one unit.
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT doc FROM users WHERE subject_id = $1 FOR UPDATE")
            .bind(subject_id)
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            return Err(AppError::NotFound(format!("User {}", subject_id)));
        };

        let mut user = Self::decode(row.try_get("doc")?)?;
        let inserted = user.record_recommendation(entry);
        if inserted && count_toward_quota {
            user.daily_quota.roll(Utc::now().date_naive());
            user.daily_quota.count += 1;
        }

        let doc = serde_json::to_value(&user)
            .map_err(|e| AppError::Internal(format!("User document encode error: {}", e)))?;
        sqlx::query("UPDATE users SET doc = $2, updated_at = now() WHERE subject_id = $1")
            .bind(subject_id)
            .bind(doc)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }
}

/// Canonical movie records stored as one JSONB document per external id.
#[derive(Clone)]
pub struct PgMovieStore {
    pool: PgPool,
}

impl PgMovieStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(doc: serde_json::Value) -> AppResult<CanonicalMovie> {
        serde_json::from_value(doc)
            .map_err(|e| AppError::Internal(format!("Movie document decode error: {}", e)))
    }
}

#[async_trait]
impl MovieStore for PgMovieStore {
    async fn fetch(&self, tmdb_id: i64) -> AppResult<Option<CanonicalMovie>> {
        let row = sqlx::query("SELECT doc FROM movies WHERE tmdb_id = $1")
            .bind(tmdb_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(Self::decode(row.try_get("doc")?)?)),
            None => Ok(None),
        }
    }

    async fn insert_if_absent(&self, movie: &CanonicalMovie) -> AppResult<()> {
        let doc = serde_json::to_value(movie)
            .map_err(|e| AppError::Internal(format!("Movie document encode error: {}", e)))?;

        // Races on first resolution collapse to a no-op here.
        sqlx::query(
            "INSERT INTO movies (tmdb_id, doc) VALUES ($1, $2) ON CONFLICT (tmdb_id) DO NOTHING",
        )
        .bind(movie.tmdb_id)
        .bind(doc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_title(&self, title: &str) -> AppResult<Vec<CanonicalMovie>> {
        let rows = sqlx::query("SELECT doc FROM movies WHERE lower(doc->>'title') = lower($1)")
            .bind(title)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| Self::decode(row.try_get("doc")?))
            .collect()
    }
}
