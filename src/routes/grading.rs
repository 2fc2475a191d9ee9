use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Extension, Json,
};
use uuid::Uuid;

use crate::dto::authoring_dto::GradeEssayPayload;
use crate::error::Result;
use crate::middleware::auth::Claims;
use crate::utils::validation::validate;
use crate::AppState;

#[axum::debug_handler]
pub async fn grade_essay(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(attempt_id): Path<Uuid>,
    Json(payload): Json<GradeEssayPayload>,
) -> Result<impl IntoResponse> {
    validate(&payload)?;
    let session = state
        .attempt_service
        .grade_essay(
            attempt_id,
            payload.question_id,
            payload.points,
            payload.feedback,
        )
        .await?;
    tracing::debug!(%attempt_id, grader = %claims.sub, "Essay grade recorded");
    Ok(Json(session))
}
