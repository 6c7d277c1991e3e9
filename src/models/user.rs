use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::movie::MovieRef;

/// Recommendation history is bounded to the most recent entries
pub const HISTORY_LIMIT: usize = 100;

/// Bucket used when a movie arrives without usable genre data
pub const UNCATEGORIZED: &str = "uncategorized";

/// Genre-partitioned movie collection.
///
/// Keys are lowercase canonical genre names; values keep insertion order
/// (most recent reasoning relies on it). A movie may appear under several
/// genres it belongs to, but at most once per genre (replace-by-id).
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(transparent)]
pub struct GenreBuckets {
    buckets: BTreeMap<String, Vec<MovieRef>>,
}

/// Accepts either the bucketed shape or a legacy flat array of movie refs.
/// Flat arrays are a one-time best-effort import into "uncategorized".
#[derive(Deserialize)]
#[serde(untagged)]
enum GenreBucketsRepr {
    Buckets(BTreeMap<String, Vec<MovieRef>>),
    Legacy(Vec<MovieRef>),
}

impl<'de> Deserialize<'de> for GenreBuckets {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let buckets = match GenreBucketsRepr::deserialize(deserializer)? {
            GenreBucketsRepr::Buckets(map) => map,
            GenreBucketsRepr::Legacy(movies) => {
                let mut map = BTreeMap::new();
                if !movies.is_empty() {
                    map.insert(UNCATEGORIZED.to_string(), movies);
                }
                map
            }
        };
        Ok(GenreBuckets { buckets })
    }
}

impl GenreBuckets {
    /// Inserts the movie into the given genre bucket, overwriting the stored
    /// fields if it is already present under that genre.
    pub fn insert_or_replace(&mut self, genre: &str, movie: MovieRef) {
        let bucket = self.buckets.entry(genre.to_string()).or_default();
        match bucket.iter_mut().find(|m| m.movie_id == movie.movie_id) {
            Some(existing) => *existing = movie,
            None => bucket.push(movie),
        }
    }

    /// Removes every entry with this movie id across all genre buckets.
    pub fn remove_movie(&mut self, movie_id: i64) {
        for bucket in self.buckets.values_mut() {
            bucket.retain(|m| m.movie_id != movie_id);
        }
        self.buckets.retain(|_, bucket| !bucket.is_empty());
    }

    pub fn contains(&self, movie_id: i64) -> bool {
        self.buckets
            .values()
            .any(|bucket| bucket.iter().any(|m| m.movie_id == movie_id))
    }

    pub fn get(&self, genre: &str) -> Option<&[MovieRef]> {
        self.buckets.get(genre).map(|b| b.as_slice())
    }

    /// View restricted to the requested genres; all buckets if the filter is
    /// empty.
    pub fn filtered(&self, genres: &[String]) -> BTreeMap<&str, &[MovieRef]> {
        self.buckets
            .iter()
            .filter(|(name, _)| genres.is_empty() || genres.iter().any(|g| g == *name))
            .map(|(name, bucket)| (name.as_str(), bucket.as_slice()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<MovieRef>)> {
        self.buckets.iter()
    }
}

/// Liked/disliked movie collections, both partitioned by genre.
///
/// Invariant: a movie id never appears on both sides at once - recording it
/// on one side strips all its entries from the other.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Preferences {
    #[serde(default)]
    pub liked: GenreBuckets,
    #[serde(default)]
    pub disliked: GenreBuckets,
}

/// Per-user daily recommendation counter with calendar-date reset semantics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyQuota {
    pub count: u32,
    pub period_start: NaiveDate,
}

impl Default for DailyQuota {
    fn default() -> Self {
        Self {
            count: 0,
            period_start: Utc::now().date_naive(),
        }
    }
}

impl DailyQuota {
    /// Resets the counter when the stored period date differs from `today`
    /// (by date, not by a rolling 24h window). Must run before any check.
    pub fn roll(&mut self, today: NaiveDate) {
        if self.period_start != today {
            self.count = 0;
            self.period_start = today;
        }
    }
}

/// A single entry in the recommendation history (newest first).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub movie_id: i64,
    pub title: String,
    /// Tri-state feedback: unset until the user accepts or rejects
    #[serde(default)]
    pub accepted: Option<bool>,
    pub timestamp: DateTime<Utc>,
}

/// User aggregate keyed by the external identity subject id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub daily_quota: DailyQuota,
    #[serde(default)]
    pub recommendation_history: Vec<HistoryEntry>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a fresh user with empty preference maps, as provisioned on
    /// first sight of an identity subject.
    pub fn new(subject_id: &str, email: &str, display_name: &str) -> Self {
        Self {
            subject_id: subject_id.to_string(),
            email: email.to_string(),
            display_name: display_name.to_string(),
            picture_url: None,
            preferences: Preferences::default(),
            daily_quota: DailyQuota::default(),
            recommendation_history: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Records a liked movie: strips it from every disliked bucket, then
    /// inserts-or-replaces it under each genre it belongs to.
    pub fn record_liked(&mut self, movie: &MovieRef) {
        self.preferences.disliked.remove_movie(movie.movie_id);
        for genre in Self::target_genres(movie) {
            self.preferences.liked.insert_or_replace(&genre, movie.clone());
        }
    }

    /// Mirror of `record_liked` for the disliked side.
    pub fn record_disliked(&mut self, movie: &MovieRef) {
        self.preferences.liked.remove_movie(movie.movie_id);
        for genre in Self::target_genres(movie) {
            self.preferences
                .disliked
                .insert_or_replace(&genre, movie.clone());
        }
    }

    fn target_genres(movie: &MovieRef) -> Vec<String> {
        if movie.genres.is_empty() {
            vec![UNCATEGORIZED.to_string()]
        } else {
            movie.genres.clone()
        }
    }

    /// Inserts into history only if no existing entry shares the movie id.
    ///
    /// Returns whether a new entry was inserted (false = duplicate, which the
    /// caller must not count toward quota). After insertion, history is
    /// re-sorted newest first and truncated to `HISTORY_LIMIT`.
    pub fn record_recommendation(&mut self, entry: HistoryEntry) -> bool {
        if self.history_contains(entry.movie_id) {
            return false;
        }

        self.recommendation_history.push(entry);
        self.recommendation_history
            .sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.recommendation_history.truncate(HISTORY_LIMIT);
        true
    }

    pub fn history_contains(&self, movie_id: i64) -> bool {
        self.recommendation_history
            .iter()
            .any(|e| e.movie_id == movie_id)
    }

    /// Updates feedback on an existing history entry, if present.
    pub fn set_history_feedback(&mut self, movie_id: i64, accepted: bool) {
        if let Some(entry) = self
            .recommendation_history
            .iter_mut()
            .find(|e| e.movie_id == movie_id)
        {
            entry.accepted = Some(accepted);
        }
    }

    /// Rolls the quota period to today and reports whether the user is still
    /// under the ceiling. Incrementing is a separate explicit step performed
    /// only after a new recommendation has been durably recorded.
    pub fn check_and_roll_daily_quota(&mut self, limit: u32) -> bool {
        self.daily_quota.roll(Utc::now().date_naive());
        self.daily_quota.count < limit
    }
}
