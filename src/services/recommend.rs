use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    db::UserStore,
    error::{AppError, AppResult},
    models::{genre_names_from_ids, normalize_genre, CanonicalMovie, HistoryEntry, TmdbMovie, User},
    services::{
        metadata_cache::MetadataCache,
        providers::{SuggestionProvider, SuggestionRequest},
        quota::QuotaTracker,
        retry::RetryPolicy,
    },
};

/// Attempt budget for a normal generation request
const MAX_ATTEMPTS: u32 = 3;

/// Raised budget when the caller asks for an alternative to the last answer
const MAX_ATTEMPTS_ALTERNATIVE: u32 = 5;

const BASE_TEMPERATURE: f32 = 0.7;
const TEMPERATURE_STEP: f32 = 0.15;
const TEMPERATURE_STEP_ALTERNATIVE: f32 = 0.25;
const MAX_TEMPERATURE: f32 = 1.5;

const SUGGESTION_MAX_TOKENS: u32 = 400;

/// Curated candidate list size
const CURATED_LIMIT: usize = 10;

const SYSTEM_PROMPT: &str = "You are a film recommendation assistant. Reply with exactly one \
    JSON object and nothing else, with fields: title (string), year (number), reason (string, \
    one or two sentences addressed to the viewer), genre (string), rating (number 0-10). \
    Never suggest a movie on the exclusion list.";

/// Session-scoped filters accompanying one recommendation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionPrefs {
    /// Restrict taste context to these genres; empty means all genres
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub moods: Vec<String>,
    #[serde(default)]
    pub social_context: Option<String>,
    /// Free-text exclusions ("nothing with clowns")
    #[serde(default)]
    pub exclusions: Vec<String>,
    /// Title of the immediately preceding answer the caller wants replaced;
    /// raises the attempt budget and the per-attempt randomness escalation
    #[serde(default)]
    pub alternative_to: Option<String>,
}

impl SessionPrefs {
    fn is_alternative(&self) -> bool {
        self.alternative_to.is_some()
    }

    fn normalized_genres(&self) -> Vec<String> {
        self.genres.iter().map(|g| normalize_genre(g)).collect()
    }
}

/// One parsed structured suggestion from the generative provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Suggestion {
    pub title: String,
    pub year: Option<i32>,
    pub reason: String,
    pub genre: Option<String>,
    pub rating: Option<f64>,
}

/// Typed outcome of one attempt through the generation state machine.
enum AttemptOutcome {
    Committed(RecommendationResponse),
    /// Retryable failure; loops back with attempt+1
    Retry { reason: String },
    Fatal(AppError),
}

/// Final response: canonical metadata merged with the rationale text.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationResponse {
    pub movie: CanonicalMovie,
    pub reason: String,
    pub attempts: u32,
}

/// A ranked curated candidate (popular-by-genre, filtered by history and
/// disliked movies).
#[derive(Debug, Clone, Serialize)]
pub struct CuratedCandidate {
    pub tmdb_id: i64,
    pub title: String,
    pub release_year: Option<i32>,
    pub genres: Vec<String>,
    pub rating: f64,
    pub popularity: f64,
    pub poster_path: Option<String>,
}

/// The recommendation orchestrator.
///
/// Runs a bounded-retry search over the probabilistic suggestion source:
/// build prompt, generate, parse, resolve to canonical metadata, check the
/// history for duplicates, then commit history + quota atomically. Failure at
/// any validation step consumes one attempt and re-runs only the generation
/// call with escalated randomness.
#[derive(Clone)]
pub struct RecommendationEngine {
    users: Arc<dyn UserStore>,
    metadata: Arc<MetadataCache>,
    suggestions: Arc<dyn SuggestionProvider>,
    quota: QuotaTracker,
    retry: RetryPolicy,
}

impl RecommendationEngine {
    pub fn new(
        users: Arc<dyn UserStore>,
        metadata: Arc<MetadataCache>,
        suggestions: Arc<dyn SuggestionProvider>,
        quota: QuotaTracker,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            users,
            metadata,
            suggestions,
            quota,
            retry,
        }
    }

    /// Produces one novel recommendation for the user, or a distinguished
    /// failure: `QuotaExceeded` before any generation work,
    /// `ExhaustedAttempts` when the attempt budget runs out without a
    /// committed success.
    pub async fn generate(
        &self,
        subject_id: &str,
        session: &SessionPrefs,
    ) -> AppResult<RecommendationResponse> {
        let mut user = self
            .users
            .fetch(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", subject_id)))?;

        let remaining = self.quota.consume(&mut user)?;
        let max_attempts = if session.is_alternative() {
            MAX_ATTEMPTS_ALTERNATIVE
        } else {
            MAX_ATTEMPTS
        };

        // Prompt content is fixed for the request; only the generation call
        // and its randomness vary between attempts.
        let prompt = build_prompt(&user, session);

        tracing::info!(
            subject = %subject_id,
            remaining = remaining,
            max_attempts = max_attempts,
            alternative = session.is_alternative(),
            "Starting recommendation generation"
        );

        for attempt in 1..=max_attempts {
            let temperature = temperature_for(attempt, session.is_alternative());
            match self.attempt(&user, &prompt, attempt, temperature).await {
                AttemptOutcome::Committed(response) => {
                    tracing::info!(
                        subject = %subject_id,
                        movie_id = response.movie.tmdb_id,
                        attempt = attempt,
                        "Recommendation committed"
                    );
                    return Ok(response);
                }
                AttemptOutcome::Retry { reason } => {
                    tracing::debug!(
                        subject = %subject_id,
                        attempt = attempt,
                        reason = %reason,
                        "Attempt failed, retrying"
                    );
                }
                AttemptOutcome::Fatal(e) => return Err(e),
            }
        }

        Err(AppError::ExhaustedAttempts {
            attempts: max_attempts,
        })
    }

    async fn attempt(
        &self,
        user: &User,
        prompt: &str,
        attempt: u32,
        temperature: f32,
    ) -> AttemptOutcome {
        // AWAITING_SUGGESTION: transient provider failures are retried by the
        // shared policy; once exhausted they cost this attempt.
        let request = SuggestionRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: prompt.to_string(),
            temperature,
            max_tokens: SUGGESTION_MAX_TOKENS,
        };
        let raw = match self
            .retry
            .run("suggestion", || self.suggestions.suggest(&request))
            .await
        {
            Ok(raw) => raw,
            Err(e @ AppError::ExternalApi { .. }) | Err(e @ AppError::HttpClient(_)) => {
                return AttemptOutcome::Retry {
                    reason: format!("suggestion provider: {e}"),
                }
            }
            Err(e) => return AttemptOutcome::Fatal(e),
        };

        // VALIDATING_SUGGESTION
        let suggestion = match parse_suggestion(&raw) {
            Ok(suggestion) => suggestion,
            Err(cause) => {
                return AttemptOutcome::Retry {
                    reason: format!("unparseable suggestion: {cause}"),
                }
            }
        };

        // RESOLVING_METADATA
        let movie = match self
            .metadata
            .resolve_title(&suggestion.title, suggestion.year)
            .await
        {
            Ok(Some(movie)) => movie,
            Ok(None) => {
                return AttemptOutcome::Retry {
                    reason: format!("no metadata for '{}'", suggestion.title),
                }
            }
            Err(e @ AppError::Database(_)) | Err(e @ AppError::Internal(_)) => {
                return AttemptOutcome::Fatal(e)
            }
            Err(e) => {
                return AttemptOutcome::Retry {
                    reason: format!("metadata resolution: {e}"),
                }
            }
        };

        // CHECKING_DUPLICATE: bail before the commit rather than relying on
        // the store's no-op, so a duplicate never reaches the caller.
        if user.history_contains(movie.tmdb_id) {
            return AttemptOutcome::Retry {
                reason: format!("'{}' already in history", movie.title),
            };
        }

        // COMMITTING: history insert + quota bump + save are one unit.
        let entry = HistoryEntry {
            movie_id: movie.tmdb_id,
            title: movie.title.clone(),
            accepted: None,
            timestamp: Utc::now(),
        };
        match self
            .users
            .commit_recommendation(&user.subject_id, entry, true)
            .await
        {
            Ok(true) => AttemptOutcome::Committed(RecommendationResponse {
                movie,
                reason: suggestion.reason,
                attempts: attempt,
            }),
            // A concurrent request committed this movie first.
            Ok(false) => AttemptOutcome::Retry {
                reason: format!("'{}' committed concurrently", movie.title),
            },
            Err(e) => AttemptOutcome::Fatal(e),
        }
    }

    /// Popular-by-genre candidates ranked by a replaceable scoring policy,
    /// with the user's history and disliked movies excluded.
    pub async fn curated_candidates(
        &self,
        subject_id: &str,
        genre: Option<&str>,
    ) -> AppResult<Vec<CuratedCandidate>> {
        let user = self
            .users
            .fetch(subject_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {}", subject_id)))?;

        let popular = self.metadata.get_popular(genre, 1).await?;
        Ok(rank_candidates(&popular.results, &user))
    }
}

/// Temperature escalates monotonically with the attempt number to diversify
/// repeated failures; alternative mode escalates faster.
fn temperature_for(attempt: u32, alternative: bool) -> f32 {
    let step = if alternative {
        TEMPERATURE_STEP_ALTERNATIVE
    } else {
        TEMPERATURE_STEP
    };
    (BASE_TEMPERATURE + step * (attempt - 1) as f32).min(MAX_TEMPERATURE)
}

/// Assembles the context-rich prompt: genre-filtered taste buckets, session
/// hints, the accepted/rejected split, and the full history as an exclusion
/// list.
fn build_prompt(user: &User, session: &SessionPrefs) -> String {
    let genres = session.normalized_genres();
    let mut sections = Vec::new();

    if genres.is_empty() {
        sections.push("Suggest one movie for tonight.".to_string());
    } else {
        sections.push(format!(
            "Suggest one movie for tonight in these genres: {}.",
            genres.join(", ")
        ));
    }

    let liked = user.preferences.liked.filtered(&genres);
    if !liked.is_empty() {
        let lines: Vec<String> = liked
            .iter()
            .map(|(genre, movies)| format!("  {}: {}", genre, titles(movies)))
            .collect();
        sections.push(format!("Movies the viewer liked:\n{}", lines.join("\n")));
    }

    let disliked = user.preferences.disliked.filtered(&genres);
    if !disliked.is_empty() {
        let lines: Vec<String> = disliked
            .iter()
            .map(|(genre, movies)| format!("  {}: {}", genre, titles(movies)))
            .collect();
        sections.push(format!("Movies the viewer disliked:\n{}", lines.join("\n")));
    }

    if !session.moods.is_empty() {
        sections.push(format!("Mood: {}.", session.moods.join(", ")));
    }
    if let Some(context) = &session.social_context {
        sections.push(format!("Watching context: {}.", context));
    }
    if !session.exclusions.is_empty() {
        sections.push(format!("Avoid: {}.", session.exclusions.join("; ")));
    }

    let accepted: Vec<&str> = user
        .recommendation_history
        .iter()
        .filter(|e| e.accepted == Some(true))
        .map(|e| e.title.as_str())
        .collect();
    if !accepted.is_empty() {
        sections.push(format!(
            "Past recommendations the viewer accepted: {}.",
            accepted.join(", ")
        ));
    }

    let rejected: Vec<&str> = user
        .recommendation_history
        .iter()
        .filter(|e| e.accepted == Some(false))
        .map(|e| e.title.as_str())
        .collect();
    if !rejected.is_empty() {
        sections.push(format!(
            "Past recommendations the viewer rejected: {}.",
            rejected.join(", ")
        ));
    }

    if !user.recommendation_history.is_empty() {
        let all: Vec<&str> = user
            .recommendation_history
            .iter()
            .map(|e| e.title.as_str())
            .collect();
        sections.push(format!(
            "Exclusion list (never suggest these): {}.",
            all.join(", ")
        ));
    }

    if let Some(previous) = &session.alternative_to {
        sections.push(format!(
            "The viewer declined \"{}\" just now - suggest something clearly different.",
            previous
        ));
    }

    sections.join("\n\n")
}

fn titles(movies: &[crate::models::MovieRef]) -> String {
    movies
        .iter()
        .map(|m| m.title.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Defensively parses the provider's free-text reply into a structured
/// suggestion: strips incidental wrapping (code fences, surrounding prose)
/// down to the outermost JSON object, then extracts fields tolerantly.
/// Title and reason are required.
pub fn parse_suggestion(raw: &str) -> Result<Suggestion, String> {
    let start = raw.find('{').ok_or("no JSON object in reply")?;
    let end = raw.rfind('}').ok_or("no closing brace in reply")?;
    if end <= start {
        return Err("malformed JSON object in reply".to_string());
    }

    let value: serde_json::Value =
        serde_json::from_str(&raw[start..=end]).map_err(|e| e.to_string())?;

    let title = value
        .get("title")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or("missing title")?
        .to_string();

    let reason = value
        .get("reason")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or("missing reason")?
        .to_string();

    // Year may arrive as a number or a string.
    let year = match value.get("year") {
        Some(serde_json::Value::Number(n)) => n.as_i64().map(|y| y as i32),
        Some(serde_json::Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };

    let genre = value
        .get("genre")
        .and_then(|v| v.as_str())
        .map(normalize_genre);

    let rating = value.get("rating").and_then(|v| v.as_f64());

    Ok(Suggestion {
        title,
        year,
        reason,
        genre,
        rating,
    })
}

/// Replaceable ranking policy for curated candidates: rating, vote count,
/// and popularity blended with a randomization term. The coefficients are
/// tuned, not a contract.
fn candidate_score(movie: &TmdbMovie) -> f64 {
    movie.vote_average * 1.5
        + ((1 + movie.vote_count) as f64).ln() * 0.8
        + movie.popularity * 0.01
        + rand::thread_rng().gen_range(0.0..1.5)
}

fn rank_candidates(listings: &[TmdbMovie], user: &User) -> Vec<CuratedCandidate> {
    let mut scored: Vec<(f64, &TmdbMovie)> = listings
        .iter()
        .filter(|m| !user.history_contains(m.id) && !user.preferences.disliked.contains(m.id))
        .map(|m| (candidate_score(m), m))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(CURATED_LIMIT)
        .map(|(_, m)| CuratedCandidate {
            tmdb_id: m.id,
            title: m.title.clone(),
            release_year: m.release_year(),
            genres: genre_names_from_ids(&m.genre_ids),
            rating: m.vote_average,
            popularity: m.popularity,
            poster_path: m.poster_path.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovieRef;

    #[test]
    fn test_parse_suggestion_plain_json() {
        let raw = r#"{"title": "Heat", "year": 1995, "reason": "A tense heist classic.", "genre": "Crime", "rating": 8.3}"#;
        let suggestion = parse_suggestion(raw).unwrap();

        assert_eq!(suggestion.title, "Heat");
        assert_eq!(suggestion.year, Some(1995));
        assert_eq!(suggestion.genre.as_deref(), Some("crime"));
        assert_eq!(suggestion.rating, Some(8.3));
    }

    #[test]
    fn test_parse_suggestion_strips_code_fence() {
        let raw = "```json\n{\"title\": \"Heat\", \"reason\": \"Great.\"}\n```";
        let suggestion = parse_suggestion(raw).unwrap();
        assert_eq!(suggestion.title, "Heat");
    }

    #[test]
    fn test_parse_suggestion_strips_surrounding_prose() {
        let raw = "Sure! Here is my pick:\n{\"title\": \"Heat\", \"reason\": \"Great.\"}\nEnjoy!";
        let suggestion = parse_suggestion(raw).unwrap();
        assert_eq!(suggestion.title, "Heat");
    }

    #[test]
    fn test_parse_suggestion_year_as_string() {
        let raw = r#"{"title": "Heat", "year": "1995", "reason": "Great."}"#;
        assert_eq!(parse_suggestion(raw).unwrap().year, Some(1995));
    }

    #[test]
    fn test_parse_suggestion_missing_title_fails() {
        let raw = r#"{"year": 1995, "reason": "Great."}"#;
        assert!(parse_suggestion(raw).is_err());
    }

    #[test]
    fn test_parse_suggestion_missing_reason_fails() {
        let raw = r#"{"title": "Heat"}"#;
        assert!(parse_suggestion(raw).is_err());
    }

    #[test]
    fn test_parse_suggestion_no_json_fails() {
        assert!(parse_suggestion("I suggest Heat from 1995").is_err());
    }

    #[test]
    fn test_temperature_escalates_monotonically() {
        let mut last = 0.0;
        for attempt in 1..=5 {
            let t = temperature_for(attempt, false);
            assert!(t >= last);
            last = t;
        }
    }

    #[test]
    fn test_temperature_alternative_escalates_faster() {
        assert!(temperature_for(3, true) > temperature_for(3, false));
    }

    #[test]
    fn test_temperature_is_capped() {
        assert_eq!(temperature_for(20, true), MAX_TEMPERATURE);
    }

    fn user_with_taste() -> User {
        let mut user = User::new("sub1", "a@b.c", "A");
        user.record_liked(&MovieRef {
            movie_id: 1,
            title: "Superbad".to_string(),
            genres: vec!["comedy".to_string()],
        });
        user.record_liked(&MovieRef {
            movie_id: 2,
            title: "Heat".to_string(),
            genres: vec!["crime".to_string()],
        });
        user.record_recommendation(HistoryEntry {
            movie_id: 3,
            title: "The Hangover".to_string(),
            accepted: Some(false),
            timestamp: Utc::now(),
        });
        user
    }

    #[test]
    fn test_prompt_filters_buckets_by_session_genres() {
        let user = user_with_taste();
        let session = SessionPrefs {
            genres: vec!["Comedy".to_string()],
            ..Default::default()
        };

        let prompt = build_prompt(&user, &session);
        assert!(prompt.contains("Superbad"));
        assert!(!prompt.contains("Heat"));
    }

    #[test]
    fn test_prompt_includes_history_exclusions_and_rejections() {
        let user = user_with_taste();
        let prompt = build_prompt(&user, &SessionPrefs::default());

        assert!(prompt.contains("Exclusion list"));
        assert!(prompt.contains("The Hangover"));
        assert!(prompt.contains("rejected"));
    }

    #[test]
    fn test_prompt_alternative_mode_names_declined_title() {
        let user = user_with_taste();
        let session = SessionPrefs {
            alternative_to: Some("Step Brothers".to_string()),
            ..Default::default()
        };

        let prompt = build_prompt(&user, &session);
        assert!(prompt.contains("Step Brothers"));
        assert!(prompt.contains("clearly different"));
    }

    fn listing(id: i64, title: &str, rating: f64, votes: u64) -> TmdbMovie {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "title": title,
            "vote_average": rating,
            "vote_count": votes,
            "popularity": 10.0,
            "genre_ids": [35]
        }))
        .unwrap()
    }

    #[test]
    fn test_rank_candidates_excludes_history_and_disliked() {
        let mut user = User::new("sub1", "a@b.c", "A");
        user.record_recommendation(HistoryEntry {
            movie_id: 1,
            title: "Seen".to_string(),
            accepted: None,
            timestamp: Utc::now(),
        });
        user.record_disliked(&MovieRef {
            movie_id: 2,
            title: "Hated".to_string(),
            genres: vec!["comedy".to_string()],
        });

        let listings = vec![
            listing(1, "Seen", 8.0, 1000),
            listing(2, "Hated", 8.0, 1000),
            listing(3, "Fresh", 7.0, 500),
        ];

        let candidates = rank_candidates(&listings, &user);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].tmdb_id, 3);
        assert_eq!(candidates[0].genres, vec!["comedy"]);
    }

    #[test]
    fn test_rank_candidates_bounded() {
        let user = User::new("sub1", "a@b.c", "A");
        let listings: Vec<TmdbMovie> = (0..30)
            .map(|i| listing(i, &format!("Movie {i}"), 7.0, 100))
            .collect();

        assert_eq!(rank_candidates(&listings, &user).len(), CURATED_LIMIT);
    }

    #[test]
    fn test_strong_candidates_rank_above_weak_ones() {
        let user = User::new("sub1", "a@b.c", "A");
        // Jitter is at most 1.5; the score gap here is far larger.
        let listings = vec![
            listing(1, "Weak", 2.0, 10),
            listing(2, "Strong", 9.0, 50_000),
        ];

        let candidates = rank_candidates(&listings, &user);
        assert_eq!(candidates[0].tmdb_id, 2);
    }
}
