// src/models/student.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::result::ExaminationResult;

/// Represents the 'students' table in the database.
///
/// `exam_order` is the fixed examination sequence position, assigned as
/// `max(existing order) + 1` at enrollment and never reused. Students are
/// immutable after creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,
    pub exam_id: i64,
    /// External student number, e.g. from the institution's registry.
    pub student_ident: String,
    pub name: String,
    pub exam_order: i64,
}

/// DTO for enrolling a student in an exam.
#[derive(Debug, Deserialize, Validate)]
pub struct EnrollStudentRequest {
    #[validate(length(min = 1, max = 50, message = "Student ID must be between 1 and 50 characters."))]
    pub student_ident: String,
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters."))]
    pub name: String,
}

/// A student joined with their result, for the exam-details view.
#[derive(Debug, Serialize)]
pub struct StudentWithResult {
    pub id: i64,
    pub student_ident: String,
    pub name: String,
    pub exam_order: i64,
    pub result: Option<ExaminationResult>,
}
