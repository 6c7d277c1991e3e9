use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::{genre_names_from_ids, normalize_genre, HistoryEntry, MovieRef, Preferences, User},
    services::metadata_cache::MetadataCache,
};

/// Caller-supplied preference changes.
///
/// Genre names are normalized to lowercase canonical keys on ingest; ids in
/// `remove` are stripped from both sides of the preference map.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub liked: Vec<MovieRef>,
    #[serde(default)]
    pub disliked: Vec<MovieRef>,
    #[serde(default)]
    pub remove: Vec<i64>,
}

impl PreferencesPatch {
    pub fn apply_to(&self, user: &mut User) {
        for movie in &self.liked {
            user.record_liked(&Self::normalized(movie));
        }
        for movie in &self.disliked {
            user.record_disliked(&Self::normalized(movie));
        }
        for movie_id in &self.remove {
            user.preferences.liked.remove_movie(*movie_id);
            user.preferences.disliked.remove_movie(*movie_id);
        }
    }

    fn normalized(movie: &MovieRef) -> MovieRef {
        MovieRef {
            movie_id: movie.movie_id,
            title: movie.title.clone(),
            genres: movie.genres.iter().map(|g| normalize_genre(g)).collect(),
        }
    }
}

/// Owns the per-user genre-partitioned preference collections and the
/// recommendation history, fronting the durable user store.
#[derive(Clone)]
pub struct PreferenceStore {
    users: Arc<dyn UserStore>,
    metadata: Arc<MetadataCache>,
}

impl PreferenceStore {
    pub fn new(users: Arc<dyn UserStore>, metadata: Arc<MetadataCache>) -> Self {
        Self { users, metadata }
    }

    async fn fetch_user(&self, subject_id: &str) -> AppResult<User> {
        self.users
            .fetch(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", subject_id)))
    }

    pub async fn get_preferences(&self, subject_id: &str) -> AppResult<Preferences> {
        Ok(self.fetch_user(subject_id).await?.preferences)
    }

    pub async fn update_preferences(
        &self,
        subject_id: &str,
        patch: &PreferencesPatch,
    ) -> AppResult<Preferences> {
        let mut user = self.fetch_user(subject_id).await?;
        patch.apply_to(&mut user);
        self.users.upsert(&user).await?;
        Ok(user.preferences)
    }

    /// Records accepted/rejected feedback for a movie.
    ///
    /// Metadata is always backfilled before the sentiment is written - by id
    /// first, then by history title as a fallback - so genre buckets are
    /// populated with genuine genre lists rather than caller-supplied
    /// unchecked values. Caller-supplied genre ids are only used when both
    /// lookups fail.
    pub async fn record_feedback(
        &self,
        subject_id: &str,
        movie_id: i64,
        accepted: bool,
        raw_genre_ids: &[i64],
    ) -> AppResult<()> {
        let mut user = self.fetch_user(subject_id).await?;
        let movie_ref = self.backfill_movie_ref(&user, movie_id, raw_genre_ids).await?;

        if accepted {
            user.record_liked(&movie_ref);
        } else {
            user.record_disliked(&movie_ref);
        }
        user.set_history_feedback(movie_id, accepted);

        self.users.upsert(&user).await?;

        tracing::info!(
            subject = %subject_id,
            movie_id = movie_id,
            accepted = accepted,
            "Feedback recorded"
        );

        Ok(())
    }

    async fn backfill_movie_ref(
        &self,
        user: &User,
        movie_id: i64,
        raw_genre_ids: &[i64],
    ) -> AppResult<MovieRef> {
        match self.metadata.get_or_fetch_details(movie_id).await {
            Ok(movie) => return Ok(MovieRef::from(&movie)),
            Err(e) => {
                tracing::warn!(movie_id = movie_id, error = %e, "Metadata backfill by id failed");
            }
        }

        let history_title = user
            .recommendation_history
            .iter()
            .find(|e| e.movie_id == movie_id)
            .map(|e| e.title.clone());

        if let Some(title) = &history_title {
            if let Ok(Some(movie)) = self.metadata.resolve_title(title, None).await {
                return Ok(MovieRef::from(&movie));
            }
        }

        let Some(title) = history_title else {
            return Err(AppError::NotFound(format!(
                "Movie {} has no resolvable metadata",
                movie_id
            )));
        };

        Ok(MovieRef {
            movie_id,
            title,
            genres: genre_names_from_ids(raw_genre_ids),
        })
    }

    /// Inserts a recommendation into history if its movie id is new.
    ///
    /// Returns whether a new entry was inserted; a duplicate is a no-op
    /// reported as such and must not count toward quota.
    pub async fn record_recommendation(
        &self,
        subject_id: &str,
        movie_id: i64,
        title: &str,
        accepted: Option<bool>,
    ) -> AppResult<bool> {
        let entry = HistoryEntry {
            movie_id,
            title: title.to_string(),
            accepted,
            timestamp: Utc::now(),
        };
        self.users
            .commit_recommendation(subject_id, entry, false)
            .await
    }
}
