use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    cached,
    db::CacheKey,
    error::AppResult,
    models::{
        QualificationCheck, QualificationSummary, RecommendationFilters, RecommendationResponse,
        SimilarProgram,
    },
};

use super::state::AppState;

const DEFAULT_LIMIT: usize = 10;

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    #[serde(flatten)]
    pub filters: RecommendationFilters,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Deserialize)]
pub struct FieldQuery {
    pub field: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Checks one user against one program and persists the resulting status
pub async fn check_qualification(
    State(state): State<AppState>,
    Path((user_id, program_id)): Path<(i64, i64)>,
) -> AppResult<Json<QualificationCheck>> {
    let check = state.qualification.check(user_id, program_id).await?;
    Ok(Json(check))
}

/// Checks one user against every active program
pub async fn check_all_qualifications(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<QualificationCheck>>> {
    let checks = state.qualification.check_all(user_id).await?;
    Ok(Json(checks))
}

/// Bucketed view of a user's persisted qualification statuses
pub async fn qualification_summary(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<QualificationSummary>> {
    let summary = state.qualification.summary(user_id).await?;
    Ok(Json(summary))
}

/// Ranked recommendations for a user, with caller filters applied
pub async fn recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let response = state
        .recommendations
        .recommendations(user_id, request.filters, request.limit)
        .await?;
    Ok(Json(response))
}

/// Kicks off a background re-check of the user's statuses.
///
/// Responds as soon as the scan is spawned; results land in the status
/// store and show up on subsequent requests.
pub async fn refresh_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> (StatusCode, Json<Value>) {
    state.qualification.spawn_full_scan(user_id);
    (
        StatusCode::ACCEPTED,
        Json(json!({
            "user_id": user_id,
            "status": "refresh started",
        })),
    )
}

/// Programs similar to a given base program, cached when Redis is wired
pub async fn similar_programs(
    State(state): State<AppState>,
    Path(program_id): Path<i64>,
    Query(query): Query<LimitQuery>,
) -> AppResult<Json<Vec<SimilarProgram>>> {
    let similar = match &state.cache {
        Some(cache) => {
            let key = CacheKey::SimilarPrograms {
                program_id,
                limit: query.limit,
            };
            let result: AppResult<Vec<SimilarProgram>> = cached!(
                cache,
                key,
                state.similarity_cache_ttl,
                state.similarity.similar_programs(program_id, query.limit)
            );
            result?
        }
        None => {
            state
                .similarity
                .similar_programs(program_id, query.limit)
                .await?
        }
    };
    Ok(Json(similar))
}

/// Programs related to a free-text field of study, cached when Redis is wired
pub async fn similar_programs_by_field(
    State(state): State<AppState>,
    Query(query): Query<FieldQuery>,
) -> AppResult<Json<Vec<SimilarProgram>>> {
    let similar = match &state.cache {
        Some(cache) => {
            let key = CacheKey::FieldSearch {
                field: query.field.clone(),
                limit: query.limit,
            };
            let result: AppResult<Vec<SimilarProgram>> = cached!(
                cache,
                key,
                state.similarity_cache_ttl,
                state
                    .similarity
                    .similar_programs_by_field(&query.field, query.limit)
            );
            result?
        }
        None => {
            state
                .similarity
                .similar_programs_by_field(&query.field, query.limit)
                .await?
        }
    };
    Ok(Json(similar))
}
