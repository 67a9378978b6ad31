// src/handlers/session.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde::Deserialize;
use validator::Validate;

use crate::{error::AppError, session::SessionService};

/// DTO for loading an exam into the session slot.
#[derive(Debug, Deserialize)]
pub struct LoadSessionRequest {
    pub exam_id: i64,
}

/// DTO for submitting the current student's grade.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitGradeRequest {
    /// A value of the recorded grade scale; anything else is rejected.
    pub grade: i64,
    #[validate(length(max = 1000, message = "Notes must be at most 1000 characters."))]
    pub notes: Option<String>,
}

/// Loads an exam into the session, resuming from persisted results.
pub async fn load_session(
    State(service): State<SessionService>,
    Json(payload): Json<LoadSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = service.load_exam(payload.exam_id).await?;
    Ok(Json(snapshot))
}

/// Current session projection.
pub async fn get_session(
    State(service): State<SessionService>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = service.snapshot().await?;
    Ok(Json(snapshot))
}

/// Draws a question number for the active student.
pub async fn draw_question(
    State(service): State<SessionService>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = service.draw_question().await?;
    Ok(Json(snapshot))
}

/// Opens the examination window and starts the countdown.
pub async fn start_examination(
    State(service): State<SessionService>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = service.start_examination().await?;
    Ok(Json(snapshot))
}

/// Manually closes the examination window.
pub async fn end_examination(
    State(service): State<SessionService>,
) -> Result<impl IntoResponse, AppError> {
    let snapshot = service.end_examination().await?;
    Ok(Json(snapshot))
}

/// Submits the grade and notes for the current student and advances the
/// session.
pub async fn submit_grade(
    State(service): State<SessionService>,
    Json(payload): Json<SubmitGradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let snapshot = service.submit_grade(payload.grade, payload.notes).await?;
    Ok(Json(snapshot))
}
