use std::sync::Arc;

use axum::middleware::from_fn;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use uniguide_api::{
    api::{router, AppState},
    config::Config,
    db::{create_pool, create_redis_client, Cache},
    middleware::{make_span_with_request_id, request_id_middleware},
    services::{QualificationService, RecommendationService, SimilarityService},
    stores::{PgCatalog, PgProfileStore, PgStatusStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url, config.database_pool_size).await?;
    tracing::info!("Connected to Postgres");

    let cache = match create_redis_client(&config.redis_url) {
        Ok(client) => {
            tracing::info!("Connected to Redis");
            Some(Cache::new(client))
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, running without cache");
            None
        }
    };

    let catalog = Arc::new(PgCatalog::new(pool.clone()));
    let profiles = Arc::new(PgProfileStore::new(pool.clone()));
    let statuses = Arc::new(PgStatusStore::new(pool));

    let qualification = Arc::new(QualificationService::new(
        catalog.clone(),
        profiles.clone(),
        statuses.clone(),
    ));
    let recommendations = Arc::new(RecommendationService::new(
        catalog.clone(),
        profiles,
        statuses,
        qualification.clone(),
        config.status_ttl_minutes,
    ));
    let similarity = Arc::new(SimilarityService::new(catalog));

    let state = AppState {
        qualification,
        recommendations,
        similarity,
        cache,
        similarity_cache_ttl: config.similarity_cache_ttl,
    };

    let app = router(state)
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(from_fn(request_id_middleware))
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "Server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
