use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::dto::authoring_dto::{CreateTestPayload, DeleteTestResponse, ListTestsQuery};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::AppState;

#[axum::debug_handler]
pub async fn create_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTestPayload>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.create_test(payload, &claims.sub).await?;
    Ok((StatusCode::CREATED, Json(test)))
}

#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Query(query): Query<ListTestsQuery>,
) -> Result<impl IntoResponse> {
    let tests = state
        .test_service
        .list_tests(query.class_id.as_deref())
        .await?;
    Ok(Json(tests))
}

#[axum::debug_handler]
pub async fn get_test(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let test = state.test_service.get_test(test_id).await?;
    Ok(Json(test))
}

#[axum::debug_handler]
pub async fn delete_test(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let removed_attempts = state.test_service.delete_test(test_id).await?;
    tracing::info!(%test_id, deleted_by = %claims.sub, "Test removed via API");
    Ok(Json(DeleteTestResponse {
        deleted: true,
        removed_attempts,
    }))
}

#[axum::debug_handler]
pub async fn list_submissions(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let sessions = state.attempt_service.list_submissions(test_id).await?;
    Ok(Json(sessions))
}

#[axum::debug_handler]
pub async fn get_analytics(
    State(state): State<AppState>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let snapshot = state.analytics_service.get_analytics(test_id).await?;
    Ok(Json(snapshot))
}
