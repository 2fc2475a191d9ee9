pub mod authoring;
pub mod grading;
pub mod health;
pub mod public;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::middleware::{auth, cors::attempt_cors};
use crate::AppState;

pub fn router(state: AppState) -> Router {
    let base_routes = Router::new().route("/health", get(health::health));

    let authoring_api = Router::new()
        .route("/api/tests", get(authoring::list_tests).post(authoring::create_test))
        .route(
            "/api/tests/:id",
            get(authoring::get_test).delete(authoring::delete_test),
        )
        .route("/api/tests/:id/submissions", get(authoring::list_submissions))
        .route("/api/tests/:id/analytics", get(authoring::get_analytics))
        .route("/api/attempts/:id/grade-essay", post(grading::grade_essay))
        .layer(from_fn_with_state(state.clone(), auth::require_grader));

    let public_api = Router::new()
        .route("/api/public/tests", get(public::list_tests))
        .route("/api/public/tests/:id/start", post(public::start_attempt))
        .route("/api/public/attempts/:id", get(public::get_attempt))
        .route("/api/public/attempts/:id/status", get(public::get_status))
        .route("/api/public/attempts/:id/answer", patch(public::save_answer))
        .route("/api/public/attempts/:id/draft", put(public::buffer_draft))
        .route(
            "/api/public/attempts/:id/integrity-events",
            post(public::record_integrity_event),
        )
        .route("/api/public/attempts/:id/submit", post(public::submit_attempt))
        .layer(from_fn_with_state(state.clone(), auth::require_bearer_auth));

    Router::new()
        .merge(base_routes)
        .merge(authoring_api)
        .merge(public_api)
        .layer(TraceLayer::new_for_http())
        .layer(attempt_cors())
        .with_state(state)
}
