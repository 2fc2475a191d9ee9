//! Student-facing endpoints. The token subject is the student id, and every
//! attempt route checks that the attempt belongs to it.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::dto::public_dto::{
    DraftAnswerRequest, DraftAnswerResponse, IntegrityEventRequest, PublicTestsQuery,
    SaveAnswerRequest, SaveAnswerResponse, SubmitRequest,
};
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::models::test::TestSummary;
use crate::AppState;

#[axum::debug_handler]
pub async fn list_tests(
    State(state): State<AppState>,
    Query(query): Query<PublicTestsQuery>,
) -> Result<impl IntoResponse> {
    let tests = state
        .test_service
        .list_tests(query.class_id.as_deref())
        .await?;
    let summaries: Vec<TestSummary> = tests.iter().map(TestSummary::from).collect();
    Ok(Json(summaries))
}

#[axum::debug_handler]
pub async fn start_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(test_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    let session = svc.start_hosted(test_id, &claims.sub).await?;
    Ok(Json(svc.view(&session).await?))
}

#[axum::debug_handler]
pub async fn get_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    let session = svc.get_owned(attempt_id, &claims.sub).await?;
    Ok(Json(svc.view(&session).await?))
}

#[axum::debug_handler]
pub async fn get_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    svc.get_owned(attempt_id, &claims.sub).await?;
    Ok(Json(svc.status(attempt_id).await?))
}

#[axum::debug_handler]
pub async fn save_answer(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SaveAnswerRequest>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    svc.get_owned(attempt_id, &claims.sub).await?;
    let answer = svc.save_answer(attempt_id, req.question_id, req.value).await?;
    Ok(Json(SaveAnswerResponse {
        saved: true,
        question_id: answer.question_id,
        saved_at: answer.saved_at,
    }))
}

#[axum::debug_handler]
pub async fn buffer_draft(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<DraftAnswerRequest>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    svc.get_owned(attempt_id, &claims.sub).await?;
    let buffered = svc
        .buffer_draft(attempt_id, req.question_id, req.value)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(DraftAnswerResponse { buffered })))
}

#[axum::debug_handler]
pub async fn record_integrity_event(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<IntegrityEventRequest>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    svc.get_owned(attempt_id, &claims.sub).await?;
    let counts = svc
        .record_integrity_event(attempt_id, req.event_type, req.details)
        .await?;
    Ok(Json(counts))
}

#[axum::debug_handler]
pub async fn submit_attempt(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(req): Json<SubmitRequest>,
) -> Result<impl IntoResponse> {
    let svc = &state.attempt_service;
    svc.get_owned(attempt_id, &claims.sub).await?;
    let result = svc.submit(attempt_id, req.force).await?;
    Ok(Json(result))
}
