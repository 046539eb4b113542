use std::sync::Arc;

use crate::{
    db::Cache,
    services::{QualificationService, RecommendationService, SimilarityService},
};

/// Shared handler state.
///
/// The cache is optional so the router can run without Redis, as the
/// integration tests and local setups do.
#[derive(Clone)]
pub struct AppState {
    pub qualification: Arc<QualificationService>,
    pub recommendations: Arc<RecommendationService>,
    pub similarity: Arc<SimilarityService>,
    pub cache: Option<Cache>,
    pub similarity_cache_ttl: u64,
}
