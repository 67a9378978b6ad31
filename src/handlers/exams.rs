// src/handlers/exams.rs

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        exam::{CreateExamRequest, ExamDetail, ExamSummary, GradeBucket},
        result::ExaminationResult,
        student::StudentWithResult,
    },
    session::Grade,
    store::ExamStore,
};

/// Creates a new exam.
///
/// Field bounds (question count 1-100, duration 1-480 minutes) are
/// rejected here, before anything touches storage.
pub async fn create_exam(
    State(store): State<Arc<dyn ExamStore>>,
    Json(payload): Json<CreateExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let exam = store.create_exam(&payload).await?;

    Ok((StatusCode::CREATED, Json(exam)))
}

/// Lists all exams, newest first, with enrollment and grading counts.
pub async fn list_exams(
    State(store): State<Arc<dyn ExamStore>>,
) -> Result<impl IntoResponse, AppError> {
    let exams = store.list_exams().await?;
    Ok(Json(exams))
}

/// Retrieves a single exam with its students and their results.
pub async fn get_exam(
    State(store): State<Arc<dyn ExamStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let exam = store
        .get_exam(id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let students = store.list_students(id).await?;
    let results = store.list_results(id).await?;

    let students = students
        .into_iter()
        .map(|s| {
            let result = results.iter().find(|r| r.student_id == s.id).map(|r| {
                ExaminationResult {
                    id: r.id,
                    student_id: r.student_id,
                    question_number: r.question_number,
                    time_spent_secs: r.time_spent_secs,
                    notes: r.notes.clone(),
                    grade: r.grade,
                    completed_at: r.completed_at,
                }
            });
            StudentWithResult {
                id: s.id,
                student_ident: s.student_ident,
                name: s.name,
                exam_order: s.exam_order,
                result,
            }
        })
        .collect();

    Ok(Json(ExamDetail { exam, students }))
}

/// Results for an exam, ordered by exam order.
pub async fn list_exam_results(
    State(store): State<Arc<dyn ExamStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _exam = store
        .get_exam(id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let results = store.list_results(id).await?;
    Ok(Json(results))
}

/// Aggregated history for an exam: average grade, grade distribution
/// over the recorded scale, average examination time and completion rate.
pub async fn exam_summary(
    State(store): State<Arc<dyn ExamStore>>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let _exam = store
        .get_exam(id)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

    let students = store.list_students(id).await?;
    let results = store.list_results(id).await?;

    let average_grade = if results.is_empty() {
        None
    } else {
        Some(results.iter().map(|r| r.grade as f64).sum::<f64>() / results.len() as f64)
    };
    let average_time_secs = if results.is_empty() {
        None
    } else {
        Some(results.iter().map(|r| r.time_spent_secs as f64).sum::<f64>() / results.len() as f64)
    };
    let completion_rate = if students.is_empty() {
        0
    } else {
        ((results.len() * 100) as f64 / students.len() as f64).round() as i64
    };

    let grade_distribution = Grade::SCALE
        .iter()
        .map(|g| GradeBucket {
            grade: g.value(),
            count: results.iter().filter(|r| r.grade == g.value()).count() as i64,
        })
        .collect();

    Ok(Json(ExamSummary {
        exam_id: id,
        students_total: students.len() as i64,
        results_total: results.len() as i64,
        average_grade,
        average_time_secs,
        completion_rate,
        grade_distribution,
    }))
}
