// src/models/exam.rs

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::student::StudentWithResult;

/// Represents the 'exams' table in the database.
///
/// `completed_at` is present if and only if `is_completed` is true; the
/// flag is flipped exactly once, when the last student's result is saved
/// (or by the repair step on session load).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub exam_term: String,
    pub course_name: String,
    pub exam_date: NaiveDate,
    pub number_of_questions: i64,
    pub examination_minutes: i64,
    /// Scheduled start, as a time of day.
    pub start_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// DTO for creating a new exam.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateExamRequest {
    #[validate(length(min = 1, max = 100, message = "Exam term must be between 1 and 100 characters."))]
    pub exam_term: String,
    #[validate(length(min = 1, max = 200, message = "Course name must be between 1 and 200 characters."))]
    pub course_name: String,
    pub exam_date: NaiveDate,
    #[validate(range(min = 1, max = 100, message = "Number of questions must be between 1 and 100."))]
    pub number_of_questions: i64,
    #[validate(range(min = 1, max = 480, message = "Examination time must be between 1 and 480 minutes."))]
    pub examination_minutes: i64,
    pub start_time: NaiveTime,
}

/// List row with enrollment and grading progress counts.
#[derive(Debug, Serialize, FromRow)]
pub struct ExamOverview {
    pub id: i64,
    pub exam_term: String,
    pub course_name: String,
    pub exam_date: NaiveDate,
    pub number_of_questions: i64,
    pub examination_minutes: i64,
    pub start_time: NaiveTime,
    pub created_at: DateTime<Utc>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub student_count: i64,
    pub result_count: i64,
}

/// DTO for the exam-details view: the exam plus its students, each with
/// their result if one has been recorded.
#[derive(Debug, Serialize)]
pub struct ExamDetail {
    pub exam: Exam,
    pub students: Vec<StudentWithResult>,
}

/// One bucket of the grade distribution.
#[derive(Debug, Serialize)]
pub struct GradeBucket {
    pub grade: i64,
    pub count: i64,
}

/// Aggregated history for a single exam.
#[derive(Debug, Serialize)]
pub struct ExamSummary {
    pub exam_id: i64,
    pub students_total: i64,
    pub results_total: i64,
    /// None when no results have been recorded yet.
    pub average_grade: Option<f64>,
    pub average_time_secs: Option<f64>,
    /// Percentage of enrolled students with a recorded result, rounded.
    pub completion_rate: i64,
    pub grade_distribution: Vec<GradeBucket>,
}
