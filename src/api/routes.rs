use axum::{
    routing::{delete, get, patch, post},
    Router,
};

use super::handlers;
use super::AppState;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        // Movie catalogue
        .route("/movies/search", get(handlers::search_movies))
        .route("/movies/trending", get(handlers::get_trending))
        .route("/movies/resolve", post(handlers::resolve_movies))
        .route("/movies/cache", delete(handlers::invalidate_cache_prefix))
        .route("/movies/:id", get(handlers::get_movie))
        .route("/movies/:id/cache", delete(handlers::invalidate_movie_cache))
        // Per-user surface (bearer token required)
        .route("/curated", get(handlers::get_curated))
        .route("/recommendations", post(handlers::create_recommendation))
        .route("/feedback", post(handlers::record_feedback))
        .route("/preferences", get(handlers::get_preferences))
        .route("/preferences", patch(handlers::update_preferences))
}
