use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    models::{CanonicalMovie, Preferences, TmdbMovie, TmdbPaged, User},
    services::{
        metadata_cache::BatchResolution,
        providers::{TRENDING_DAY, TRENDING_WEEK},
        provision_user, CuratedCandidate, PreferencesPatch, RecommendationResponse, SessionPrefs,
    },
};

use super::AppState;

/// Cap on one batch resolution request
const BATCH_REQUEST_LIMIT: usize = 50;

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Resolves the bearer token to a user record, provisioning one on first
/// sight of the identity subject.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> AppResult<User> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = state.verifier.verify(token).await?;
    provision_user(&state.users, &claims).await
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

/// Handler for movie text search
pub async fn search_movies(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> AppResult<Json<TmdbPaged<TmdbMovie>>> {
    let results = state.metadata.search(&params.query, params.page).await?;
    Ok(Json(results))
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    #[serde(default = "default_window")]
    pub window: String,
}

fn default_window() -> String {
    TRENDING_WEEK.to_string()
}

/// Handler for trending movies over a day or week window
pub async fn get_trending(
    State(state): State<AppState>,
    Query(params): Query<TrendingQuery>,
) -> AppResult<Json<TmdbPaged<TmdbMovie>>> {
    if params.window != TRENDING_DAY && params.window != TRENDING_WEEK {
        return Err(AppError::InvalidInput(format!(
            "Unknown trending window '{}'",
            params.window
        )));
    }
    let results = state.metadata.get_trending(&params.window).await?;
    Ok(Json(results))
}

/// Handler for canonical movie details by external id
pub async fn get_movie(
    State(state): State<AppState>,
    Path(tmdb_id): Path<i64>,
) -> AppResult<Json<CanonicalMovie>> {
    let movie = state.metadata.get_or_fetch_details(tmdb_id).await?;
    Ok(Json(movie))
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub tmdb_ids: Vec<i64>,
}

/// Handler for batch canonical resolution
pub async fn resolve_movies(
    State(state): State<AppState>,
    Json(request): Json<ResolveRequest>,
) -> AppResult<Json<BatchResolution>> {
    if request.tmdb_ids.is_empty() {
        return Err(AppError::InvalidInput("tmdb_ids must not be empty".to_string()));
    }
    if request.tmdb_ids.len() > BATCH_REQUEST_LIMIT {
        return Err(AppError::InvalidInput(format!(
            "At most {} ids per request",
            BATCH_REQUEST_LIMIT
        )));
    }

    Ok(Json(state.metadata.resolve_batch(&request.tmdb_ids).await))
}

/// Handler dropping the cached detail payload for one movie
pub async fn invalidate_movie_cache(
    State(state): State<AppState>,
    Path(tmdb_id): Path<i64>,
) -> StatusCode {
    state.metadata.invalidate_movie(tmdb_id).await;
    StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub prefix: String,
}

/// Handler dropping a whole cached key family by prefix
pub async fn invalidate_cache_prefix(
    State(state): State<AppState>,
    Query(params): Query<InvalidateQuery>,
) -> AppResult<Json<Value>> {
    if params.prefix.is_empty() {
        return Err(AppError::InvalidInput("prefix must not be empty".to_string()));
    }
    let dropped = state.metadata.invalidate_prefix(&params.prefix).await;
    Ok(Json(json!({ "dropped": dropped })))
}

#[derive(Debug, Deserialize)]
pub struct CuratedQuery {
    pub genre: Option<String>,
}

/// Handler for the ranked curated candidate list
pub async fn get_curated(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CuratedQuery>,
) -> AppResult<Json<Vec<CuratedCandidate>>> {
    let user = authenticate(&state, &headers).await?;
    let candidates = state
        .engine
        .curated_candidates(&user.subject_id, params.genre.as_deref())
        .await?;
    Ok(Json(candidates))
}

/// Handler for generating one recommendation
pub async fn create_recommendation(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(session): Json<SessionPrefs>,
) -> AppResult<Json<RecommendationResponse>> {
    let user = authenticate(&state, &headers).await?;
    let response = state.engine.generate(&user.subject_id, &session).await?;
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub movie_id: i64,
    pub accepted: bool,
    /// Caller-supplied genre ids, used only when metadata backfill fails
    #[serde(default)]
    pub genre_ids: Vec<i64>,
}

/// Handler recording accepted/rejected feedback on a movie
pub async fn record_feedback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FeedbackRequest>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let user = authenticate(&state, &headers).await?;
    state
        .preferences
        .record_feedback(
            &user.subject_id,
            request.movie_id,
            request.accepted,
            &request.genre_ids,
        )
        .await?;
    Ok((StatusCode::OK, Json(json!({ "recorded": true }))))
}

/// Handler returning the caller's preference maps
pub async fn get_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<Preferences>> {
    let user = authenticate(&state, &headers).await?;
    let preferences = state.preferences.get_preferences(&user.subject_id).await?;
    Ok(Json(preferences))
}

/// Handler applying a preferences patch and returning the updated maps
pub async fn update_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(patch): Json<PreferencesPatch>,
) -> AppResult<Json<Preferences>> {
    let user = authenticate(&state, &headers).await?;
    let preferences = state
        .preferences
        .update_preferences(&user.subject_id, &patch)
        .await?;
    Ok(Json(preferences))
}
