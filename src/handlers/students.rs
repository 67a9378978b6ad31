// src/handlers/students.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{error::AppError, models::student::EnrollStudentRequest, store::ExamStore};

/// Enrolls a student in an exam.
///
/// The exam-order position is assigned by the store as
/// `max(existing order) + 1` and never reused.
pub async fn enroll_student(
    State(store): State<Arc<dyn ExamStore>>,
    Path(exam_id): Path<i64>,
    Json(payload): Json<EnrollStudentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let student = store.create_student(exam_id, &payload).await?;

    Ok((StatusCode::CREATED, Json(student)))
}

/// Lists the students of an exam in examination order.
pub async fn list_students(
    State(store): State<Arc<dyn ExamStore>>,
    Path(exam_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _exam = store
        .get_exam(exam_id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let students = store.list_students(exam_id).await?;
    Ok(Json(students))
}
