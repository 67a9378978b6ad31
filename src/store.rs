// src/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::{
    error::AppError,
    models::{
        exam::{CreateExamRequest, Exam, ExamOverview},
        result::{ExaminationResult, NewResult, ResultRow},
        student::{EnrollStudentRequest, Student},
    },
};

/// Durable storage for exams, students and examination results.
///
/// The session engine talks to storage exclusively through this trait;
/// nothing is considered saved until a call returns successfully.
#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn list_exams(&self) -> Result<Vec<ExamOverview>, AppError>;
    async fn get_exam(&self, id: i64) -> Result<Option<Exam>, AppError>;
    async fn create_exam(&self, req: &CreateExamRequest) -> Result<Exam, AppError>;
    /// Sets the completion flag and timestamp. Applied when the last
    /// student's result is recorded, or as a repair step on session load.
    async fn mark_exam_completed(&self, id: i64, when: DateTime<Utc>) -> Result<Exam, AppError>;

    /// Students of an exam, ordered by `exam_order`.
    async fn list_students(&self, exam_id: i64) -> Result<Vec<Student>, AppError>;
    /// Enrolls a student, assigning `exam_order` = max(existing) + 1.
    async fn create_student(
        &self,
        exam_id: i64,
        req: &EnrollStudentRequest,
    ) -> Result<Student, AppError>;

    /// Persists a result. A second result for the same student is a
    /// `Conflict`, never a second row.
    async fn create_result(&self, new: &NewResult) -> Result<ExaminationResult, AppError>;
    /// Results for an exam, joined with their students, ordered by
    /// `exam_order`.
    async fn list_results(&self, exam_id: i64) -> Result<Vec<ResultRow>, AppError>;
}

/// SQLite-backed implementation of `ExamStore`.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExamStore for SqliteStore {
    async fn list_exams(&self) -> Result<Vec<ExamOverview>, AppError> {
        let exams = sqlx::query_as::<_, ExamOverview>(
            r#"
            SELECT
                e.id, e.exam_term, e.course_name, e.exam_date,
                e.number_of_questions, e.examination_minutes, e.start_time,
                e.created_at, e.is_completed, e.completed_at,
                COUNT(DISTINCT s.id) AS student_count,
                COUNT(DISTINCT r.id) AS result_count
            FROM exams e
            LEFT JOIN students s ON s.exam_id = e.id
            LEFT JOIN examination_results r ON r.student_id = s.id
            GROUP BY e.id
            ORDER BY e.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list exams: {:?}", e);
            AppError::from(e)
        })?;

        Ok(exams)
    }

    async fn get_exam(&self, id: i64) -> Result<Option<Exam>, AppError> {
        let exam = sqlx::query_as::<_, Exam>(
            r#"
            SELECT id, exam_term, course_name, exam_date, number_of_questions,
                   examination_minutes, start_time, created_at, is_completed, completed_at
            FROM exams
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(exam)
    }

    async fn create_exam(&self, req: &CreateExamRequest) -> Result<Exam, AppError> {
        let exam = sqlx::query_as::<_, Exam>(
            r#"
            INSERT INTO exams
                (exam_term, course_name, exam_date, number_of_questions,
                 examination_minutes, start_time, created_at, is_completed)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            RETURNING id, exam_term, course_name, exam_date, number_of_questions,
                      examination_minutes, start_time, created_at, is_completed, completed_at
            "#,
        )
        .bind(&req.exam_term)
        .bind(&req.course_name)
        .bind(req.exam_date)
        .bind(req.number_of_questions)
        .bind(req.examination_minutes)
        .bind(req.start_time)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to create exam: {:?}", e);
            AppError::from(e)
        })?;

        Ok(exam)
    }

    async fn mark_exam_completed(&self, id: i64, when: DateTime<Utc>) -> Result<Exam, AppError> {
        let exam = sqlx::query_as::<_, Exam>(
            r#"
            UPDATE exams
            SET is_completed = 1, completed_at = ?
            WHERE id = ?
            RETURNING id, exam_term, course_name, exam_date, number_of_questions,
                      examination_minutes, start_time, created_at, is_completed, completed_at
            "#,
        )
        .bind(when)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(AppError::NotFound("Exam not found".to_string()))?;

        Ok(exam)
    }

    async fn list_students(&self, exam_id: i64) -> Result<Vec<Student>, AppError> {
        let students = sqlx::query_as::<_, Student>(
            r#"
            SELECT id, exam_id, student_ident, name, exam_order
            FROM students
            WHERE exam_id = ?
            ORDER BY exam_order
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(students)
    }

    async fn create_student(
        &self,
        exam_id: i64,
        req: &EnrollStudentRequest,
    ) -> Result<Student, AppError> {
        // Verify the exam exists before assigning an order slot.
        let _exam = self
            .get_exam(exam_id)
            .await?
            .ok_or(AppError::NotFound("Exam not found".to_string()))?;

        let (max_order,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(exam_order), 0) FROM students WHERE exam_id = ?")
                .bind(exam_id)
                .fetch_one(&self.pool)
                .await?;

        let student = sqlx::query_as::<_, Student>(
            r#"
            INSERT INTO students (exam_id, student_ident, name, exam_order)
            VALUES (?, ?, ?, ?)
            RETURNING id, exam_id, student_ident, name, exam_order
            "#,
        )
        .bind(exam_id)
        .bind(&req.student_ident)
        .bind(&req.name)
        .bind(max_order + 1)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to enroll student: {:?}", e);
            AppError::from(e)
        })?;

        Ok(student)
    }

    async fn create_result(&self, new: &NewResult) -> Result<ExaminationResult, AppError> {
        let result = sqlx::query_as::<_, ExaminationResult>(
            r#"
            INSERT INTO examination_results
                (student_id, question_number, time_spent_secs, notes, grade, completed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id, student_id, question_number, time_spent_secs, notes, grade, completed_at
            "#,
        )
        .bind(new.student_id)
        .bind(new.question_number)
        .bind(new.time_spent_secs)
        .bind(&new.notes)
        .bind(new.grade)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => AppError::Conflict(
                "A result has already been recorded for this student".to_string(),
            ),
            _ => {
                tracing::error!("Failed to save result: {:?}", e);
                AppError::from(e)
            }
        })?;

        Ok(result)
    }

    async fn list_results(&self, exam_id: i64) -> Result<Vec<ResultRow>, AppError> {
        let results = sqlx::query_as::<_, ResultRow>(
            r#"
            SELECT
                r.id, s.id AS student_id, s.student_ident, s.name, s.exam_order,
                r.question_number, r.time_spent_secs, r.notes, r.grade, r.completed_at
            FROM examination_results r
            JOIN students s ON r.student_id = s.id
            WHERE s.exam_id = ?
            ORDER BY s.exam_order
            "#,
        )
        .bind(exam_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!("Failed to list results: {:?}", e);
            AppError::from(e)
        })?;

        Ok(results)
    }
}
