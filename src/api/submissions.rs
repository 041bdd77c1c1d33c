//! POST /definitions/{id}/submission - evaluate a submission.
//! GET /submission/{id}/result - read back persisted submission state.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::SharedAppState;
use crate::domain::submission::Submission;
use crate::error::AppError;
use crate::orchestrator::{self, ExpectedAnswer, UserInput};

/// Body of `POST /definitions/{id}/submission`.
#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    #[serde(default)]
    pub user_inputs: Vec<UserInput>,
    #[serde(default)]
    pub expected_answers: Vec<ExpectedAnswer>,
    /// Restrict evaluation to a single task within the definition.
    #[serde(default)]
    pub task_id: Option<i64>,
}

/// POST /definitions/{id}/submission
pub async fn create_submission(
    State(state): State<SharedAppState>,
    Path(definition_id): Path<i64>,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<Submission>), AppError> {
    let submission = orchestrator::run_submission(
        state.store.as_ref(),
        state.dispatcher.as_ref(),
        definition_id,
        request.user_inputs,
        request.expected_answers,
        request.task_id,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(submission)))
}

/// GET /submission/{id}/result
pub async fn get_submission_result(
    State(state): State<SharedAppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Submission>, AppError> {
    let submission = state.store.get_submission(id).await?;
    Ok(Json(submission))
}
