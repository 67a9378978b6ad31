// src/models/result.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'examination_results' table in the database.
///
/// At most one row exists per student (UNIQUE on `student_id`); rows are
/// never mutated after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExaminationResult {
    pub id: i64,
    pub student_id: i64,
    pub question_number: i64,
    /// Wall-clock time spent in the oral phase, clamped to the exam's
    /// configured duration.
    pub time_spent_secs: i64,
    pub notes: Option<String>,
    pub grade: i64,
    pub completed_at: DateTime<Utc>,
}

/// A result to be persisted, produced by the session engine when the
/// examiner submits a grade. The store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewResult {
    pub student_id: i64,
    pub question_number: i64,
    pub time_spent_secs: i64,
    pub notes: Option<String>,
    pub grade: i64,
}

/// A result joined with its student, for history listings.
#[derive(Debug, Serialize, FromRow)]
pub struct ResultRow {
    pub id: i64,
    pub student_id: i64,
    pub student_ident: String,
    pub name: String,
    pub exam_order: i64,
    pub question_number: i64,
    pub time_spent_secs: i64,
    pub notes: Option<String>,
    pub grade: i64,
    pub completed_at: DateTime<Utc>,
}
