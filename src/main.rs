use std::sync::Arc;

use axum::middleware as axum_middleware;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelpick_api::{
    api::{create_router, AppState},
    config::Config,
    db::{
        create_pool, create_redis_client, Cache, PgMovieStore, PgUserStore, RedisBackend,
        UserStore,
    },
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{
        MetadataCache, OpenAiProvider, PreferenceStore, QuotaTracker, RecommendationEngine,
        RetryPolicy, TmdbProvider, TokeninfoVerifier,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "reelpick_api=debug,tower_http=debug,axum::rejection=trace".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = create_redis_client(&config.redis_url)?;
    let cache = Cache::new(Arc::new(RedisBackend::new(redis_client)));

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let movies = Arc::new(PgMovieStore::new(pool));

    let metadata = Arc::new(MetadataCache::new(
        cache,
        Arc::new(TmdbProvider::new(
            config.metadata_api_key.clone(),
            config.metadata_api_url.clone(),
        )),
        movies,
        RetryPolicy::default(),
    ));

    let suggestions = Arc::new(OpenAiProvider::new(
        config.llm_api_key.clone(),
        config.llm_api_url.clone(),
        config.llm_model.clone(),
    ));

    let state = AppState {
        users: users.clone(),
        verifier: Arc::new(TokeninfoVerifier::new(config.tokeninfo_url.clone())),
        metadata: metadata.clone(),
        preferences: PreferenceStore::new(users.clone(), metadata.clone()),
        engine: RecommendationEngine::new(
            users,
            metadata,
            suggestions,
            QuotaTracker::new(config.daily_recommendation_limit),
            RetryPolicy::default(),
        ),
    };

    let app = create_router(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(axum_middleware::from_fn(request_id_middleware));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
