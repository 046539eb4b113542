use axum::{
    routing::{get, post},
    Router,
};

use super::{handlers, state::AppState};

/// Builds the application router.
///
/// `/programs/similar` must be registered before `/programs/:program_id`
/// routes would shadow it, so the static path comes first.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/qualifications/:user_id/check/:program_id",
            post(handlers::check_qualification),
        )
        .route(
            "/qualifications/:user_id/check-all",
            post(handlers::check_all_qualifications),
        )
        .route(
            "/qualifications/:user_id/summary",
            get(handlers::qualification_summary),
        )
        .route("/recommendations/:user_id", post(handlers::recommendations))
        .route(
            "/recommendations/:user_id/refresh",
            post(handlers::refresh_recommendations),
        )
        .route(
            "/programs/similar",
            get(handlers::similar_programs_by_field),
        )
        .route(
            "/programs/:program_id/similar",
            get(handlers::similar_programs),
        );

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api/v1", api)
        .with_state(state)
}
