// src/session/engine.rs

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;

use crate::error::AppError;
use crate::models::{exam::Exam, result::NewResult, student::Student};

/// Grades of the Danish 7-point scale as recorded by this system.
///
/// The scale is closed: anything outside these six values is rejected at
/// the boundary, so an out-of-scale grade can never reach storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    Inadequate,
    Adequate,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl Grade {
    pub const SCALE: [Grade; 6] = [
        Grade::Inadequate,
        Grade::Adequate,
        Grade::Fair,
        Grade::Good,
        Grade::VeryGood,
        Grade::Excellent,
    ];

    /// The numeric value recorded on transcripts.
    pub const fn value(self) -> i64 {
        match self {
            Grade::Inadequate => 0,
            Grade::Adequate => 2,
            Grade::Fair => 4,
            Grade::Good => 7,
            Grade::VeryGood => 10,
            Grade::Excellent => 12,
        }
    }

    pub fn from_value(value: i64) -> Option<Grade> {
        Grade::SCALE.into_iter().find(|g| g.value() == value)
    }
}

/// The states an exam sitting moves through, one student at a time.
///
/// - `NotStarted` -> `AwaitingQuestion` (via load, >=1 ungraded student)
/// - `AwaitingQuestion` -> `QuestionDrawn` -> `ExaminationRunning`
/// - `ExaminationRunning` -> `ExaminationEnded` (manual end or expiry)
/// - `ExaminationEnded` -> `AwaitingQuestion` (next student) or
///   `AllStudentsComplete` (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    AwaitingQuestion,
    QuestionDrawn,
    ExaminationRunning,
    ExaminationEnded,
    AllStudentsComplete,
}

impl SessionState {
    /// Returns `true` once every enrolled student has a recorded result.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::AllStudentsComplete)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            SessionState::NotStarted => "not_started",
            SessionState::AwaitingQuestion => "awaiting_question",
            SessionState::QuestionDrawn => "question_drawn",
            SessionState::ExaminationRunning => "examination_running",
            SessionState::ExaminationEnded => "examination_ended",
            SessionState::AllStudentsComplete => "all_students_complete",
        };
        write!(f, "{}", tag)
    }
}

/// Typed failure reasons surfaced by the engine.
///
/// Validation and precondition errors leave the session state unchanged.
#[derive(Debug, PartialEq, Eq)]
pub enum SessionError {
    /// `load_exam` on an exam with no enrolled students.
    NoStudentsEnrolled,
    /// A session action was invoked before any exam was loaded.
    NoActiveSession,
    /// An action was invoked in a state that does not permit it.
    InvalidTransition {
        action: &'static str,
        state: SessionState,
    },
    /// A grade value outside the recorded scale.
    InvalidGrade(i64),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::NoStudentsEnrolled => {
                write!(f, "No students are enrolled in this exam")
            }
            SessionError::NoActiveSession => write!(f, "No exam session is loaded"),
            SessionError::InvalidTransition { action, state } => {
                write!(f, "Cannot {} while the session is {}", action, state)
            }
            SessionError::InvalidGrade(value) => {
                write!(f, "{} is not a grade on the recorded scale", value)
            }
        }
    }
}

impl std::error::Error for SessionError {}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NoActiveSession => AppError::NotFound(err.to_string()),
            SessionError::InvalidGrade(_) => AppError::BadRequest(err.to_string()),
            SessionError::NoStudentsEnrolled | SessionError::InvalidTransition { .. } => {
                AppError::Conflict(err.to_string())
            }
        }
    }
}

/// Read-only projection of the session, emitted after every transition.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub exam_id: i64,
    pub current_student: Option<Student>,
    pub question_number: Option<i64>,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub students_total: usize,
    pub students_graded: usize,
    pub exam_completed: bool,
}

/// The exam-session state machine.
///
/// Holds no durable state of its own: it is rebuilt from the persisted
/// Exam/Student/Result set on load, and the only ephemeral facts are the
/// current student pointer, the drawn question and the running clock.
/// Elapsed and remaining time are always recomputed from absolute
/// instants, never accumulated from tick counts, so missed or duplicated
/// ticks cannot corrupt the stored time.
#[derive(Debug)]
pub struct SessionEngine {
    exam: Exam,
    students: Vec<Student>,
    graded: HashSet<i64>,
    state: SessionState,
    current: Option<usize>,
    question_number: Option<i64>,
    started_at: Option<Instant>,
    elapsed_final: Option<Duration>,
}

impl SessionEngine {
    /// Reconciles a session against the persisted student/result set.
    ///
    /// The active student is the first, by exam order, without a result;
    /// if every student has one the session is already terminal. An exam
    /// with no students cannot be sat.
    pub fn load(
        exam: Exam,
        mut students: Vec<Student>,
        graded: HashSet<i64>,
    ) -> Result<Self, SessionError> {
        if students.is_empty() {
            return Err(SessionError::NoStudentsEnrolled);
        }
        students.sort_by_key(|s| s.exam_order);

        let current = students.iter().position(|s| !graded.contains(&s.id));
        let state = match current {
            Some(_) => SessionState::AwaitingQuestion,
            None => SessionState::AllStudentsComplete,
        };

        Ok(Self {
            exam,
            students,
            graded,
            state,
            current,
            question_number: None,
            started_at: None,
            elapsed_final: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn exam(&self) -> &Exam {
        &self.exam
    }

    pub fn current_student(&self) -> Option<&Student> {
        self.current.and_then(|i| self.students.get(i))
    }

    /// The configured examination window.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.exam.examination_minutes as u64 * 60)
    }

    /// Wall-clock time spent in the oral phase, clamped to the window.
    /// Zero before the timer has started.
    pub fn elapsed(&self, now: Instant) -> Duration {
        if let Some(done) = self.elapsed_final {
            return done;
        }
        match self.started_at {
            Some(start) => now.saturating_duration_since(start).min(self.duration()),
            None => Duration::ZERO,
        }
    }

    /// Time left in the window: `max(0, duration - elapsed)`.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.duration().saturating_sub(self.elapsed(now))
    }

    /// Samples a question number uniformly from `[1, number_of_questions]`.
    ///
    /// Draws are independent; a number used for an earlier student may
    /// come up again. There is no re-draw once a question is assigned.
    pub fn draw_question<R: Rng>(&mut self, rng: &mut R) -> Result<i64, SessionError> {
        if self.state != SessionState::AwaitingQuestion {
            return Err(SessionError::InvalidTransition {
                action: "draw a question",
                state: self.state,
            });
        }

        let question = rng.gen_range(1..=self.exam.number_of_questions);
        self.question_number = Some(question);
        self.state = SessionState::QuestionDrawn;
        Ok(question)
    }

    /// Starts the examination window for the current student.
    pub fn start_examination(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.state != SessionState::QuestionDrawn {
            return Err(SessionError::InvalidTransition {
                action: "start the examination",
                state: self.state,
            });
        }

        self.started_at = Some(now);
        self.elapsed_final = None;
        self.state = SessionState::ExaminationRunning;
        Ok(())
    }

    /// Clock tick. Returns `true` if the window expired on this tick.
    ///
    /// On expiry the elapsed time is recorded as the configured duration
    /// exactly, never a few milliseconds over. Ticks outside
    /// `ExaminationRunning` are ignored, so a stale tick can never move
    /// the session.
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.state != SessionState::ExaminationRunning {
            return false;
        }

        let expired = match self.started_at {
            Some(start) => now.saturating_duration_since(start) >= self.duration(),
            None => false,
        };
        if expired {
            self.elapsed_final = Some(self.duration());
            self.state = SessionState::ExaminationEnded;
        }
        expired
    }

    /// Manually ends the examination window, stopping the clock.
    pub fn end_examination(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.state != SessionState::ExaminationRunning {
            return Err(SessionError::InvalidTransition {
                action: "end the examination",
                state: self.state,
            });
        }

        self.elapsed_final = Some(self.elapsed(now));
        self.state = SessionState::ExaminationEnded;
        Ok(())
    }

    /// Builds the result record for the current student.
    ///
    /// Valid only in `ExaminationEnded`; the caller persists the record
    /// and then advances with [`SessionEngine::advance_after_save`]. The
    /// engine state is untouched here so a failed save can be retried.
    pub fn prepare_result(
        &self,
        grade: Grade,
        notes: Option<String>,
    ) -> Result<NewResult, SessionError> {
        if self.state != SessionState::ExaminationEnded {
            return Err(SessionError::InvalidTransition {
                action: "submit a grade",
                state: self.state,
            });
        }

        let invalid = |action| SessionError::InvalidTransition {
            action,
            state: self.state,
        };
        let student = self
            .current_student()
            .ok_or(invalid("submit a grade with no active student"))?;
        let question_number = self
            .question_number
            .ok_or(invalid("submit a grade with no question drawn"))?;
        let elapsed = self
            .elapsed_final
            .ok_or(invalid("submit a grade with no recorded time"))?;

        let notes = notes.filter(|n| !n.trim().is_empty());

        Ok(NewResult {
            student_id: student.id,
            question_number,
            time_spent_secs: elapsed.as_secs() as i64,
            notes,
            grade: grade.value(),
        })
    }

    /// Advances past a student whose result has been persisted.
    ///
    /// Moves to the next ungraded student in exam order, or to
    /// `AllStudentsComplete` when none remains. Returns the new state.
    pub fn advance_after_save(&mut self, student_id: i64) -> SessionState {
        self.graded.insert(student_id);
        self.question_number = None;
        self.started_at = None;
        self.elapsed_final = None;

        self.current = self
            .students
            .iter()
            .position(|s| !self.graded.contains(&s.id));
        self.state = match self.current {
            Some(_) => SessionState::AwaitingQuestion,
            None => SessionState::AllStudentsComplete,
        };
        self.state
    }

    /// Records that the exam's completion flag has been persisted.
    pub fn mark_exam_completed(&mut self, when: chrono::DateTime<chrono::Utc>) {
        self.exam.is_completed = true;
        self.exam.completed_at = Some(when);
    }

    pub fn snapshot(&self, now: Instant) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            exam_id: self.exam.id,
            current_student: self.current_student().cloned(),
            question_number: self.question_number,
            elapsed_secs: self.elapsed(now).as_secs(),
            remaining_secs: self.remaining(now).as_secs(),
            students_total: self.students.len(),
            students_graded: self.graded.len(),
            exam_completed: self.exam.is_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn make_exam(number_of_questions: i64, examination_minutes: i64) -> Exam {
        Exam {
            id: 1,
            exam_term: "Summer 2025".to_string(),
            course_name: "Algorithms".to_string(),
            exam_date: NaiveDate::from_ymd_opt(2025, 6, 20).unwrap(),
            number_of_questions,
            examination_minutes,
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            created_at: Utc::now(),
            is_completed: false,
            completed_at: None,
        }
    }

    fn make_students(n: i64) -> Vec<Student> {
        (1..=n)
            .map(|i| Student {
                id: i,
                exam_id: 1,
                student_ident: format!("s{:03}", i),
                name: format!("Student {}", i),
                exam_order: i,
            })
            .collect()
    }

    fn loaded(n_students: i64, minutes: i64) -> SessionEngine {
        SessionEngine::load(make_exam(5, minutes), make_students(n_students), HashSet::new())
            .unwrap()
    }

    #[test]
    fn load_without_students_is_rejected() {
        let err = SessionEngine::load(make_exam(5, 30), vec![], HashSet::new()).unwrap_err();
        assert_eq!(err, SessionError::NoStudentsEnrolled);
    }

    #[test]
    fn load_selects_first_student_in_exam_order() {
        let mut students = make_students(3);
        students.reverse();
        let engine = SessionEngine::load(make_exam(5, 30), students, HashSet::new()).unwrap();

        assert_eq!(engine.state(), SessionState::AwaitingQuestion);
        assert_eq!(engine.current_student().unwrap().exam_order, 1);
    }

    #[test]
    fn load_resumes_at_first_ungraded_student() {
        let graded: HashSet<i64> = [1, 2].into_iter().collect();
        let engine = SessionEngine::load(make_exam(5, 30), make_students(5), graded).unwrap();

        assert_eq!(engine.state(), SessionState::AwaitingQuestion);
        assert_eq!(engine.current_student().unwrap().id, 3);
    }

    #[test]
    fn load_with_all_students_graded_is_terminal() {
        let graded: HashSet<i64> = [1, 2, 3].into_iter().collect();
        let engine = SessionEngine::load(make_exam(5, 30), make_students(3), graded).unwrap();

        assert!(engine.state().is_terminal());
        assert!(engine.current_student().is_none());
    }

    #[test]
    fn draw_is_within_bounds_and_visits_every_question() {
        let mut engine = loaded(1, 30);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();

        for _ in 0..10_000 {
            let q = engine.draw_question(&mut rng).unwrap();
            assert!((1..=5).contains(&q));
            seen.insert(q);
            // Rewind the state machine; only the sampling is under test.
            engine.state = SessionState::AwaitingQuestion;
            engine.question_number = None;
        }

        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn draw_twice_is_rejected() {
        let mut engine = loaded(1, 30);
        let mut rng = StdRng::seed_from_u64(7);
        engine.draw_question(&mut rng).unwrap();

        let err = engine.draw_question(&mut rng).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                action: "draw a question",
                state: SessionState::QuestionDrawn,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn actions_out_of_order_are_rejected_without_state_change() {
        let mut engine = loaded(1, 30);
        let now = Instant::now();

        assert!(engine.start_examination(now).is_err());
        assert!(engine.end_examination(now).is_err());
        assert!(engine.prepare_result(Grade::Good, None).is_err());
        assert_eq!(engine.state(), SessionState::AwaitingQuestion);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_counts_down_from_absolute_instants() {
        let mut engine = loaded(1, 30);
        let mut rng = StdRng::seed_from_u64(1);
        engine.draw_question(&mut rng).unwrap();

        let t0 = Instant::now();
        engine.start_examination(t0).unwrap();
        assert_eq!(engine.remaining(t0), Duration::from_secs(30 * 60));

        let t = t0 + Duration::from_secs(125);
        assert!(!engine.tick(t));
        assert_eq!(engine.elapsed(t), Duration::from_secs(125));
        assert_eq!(engine.remaining(t), Duration::from_secs(30 * 60 - 125));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_clamps_elapsed_to_the_window() {
        let mut engine = loaded(1, 1);
        let mut rng = StdRng::seed_from_u64(1);
        engine.draw_question(&mut rng).unwrap();

        let t0 = Instant::now();
        engine.start_examination(t0).unwrap();

        assert!(!engine.tick(t0 + Duration::from_secs(59)));
        assert!(engine.tick(t0 + Duration::from_secs(61)));
        assert_eq!(engine.state(), SessionState::ExaminationEnded);
        assert_eq!(engine.elapsed(t0 + Duration::from_secs(61)), Duration::from_secs(60));
        assert_eq!(engine.remaining(t0 + Duration::from_secs(61)), Duration::ZERO);

        // Further ticks are no-ops.
        assert!(!engine.tick(t0 + Duration::from_secs(90)));
        assert_eq!(engine.state(), SessionState::ExaminationEnded);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_end_records_wall_clock_elapsed() {
        let mut engine = loaded(1, 30);
        let mut rng = StdRng::seed_from_u64(1);
        engine.draw_question(&mut rng).unwrap();

        let t0 = Instant::now();
        engine.start_examination(t0).unwrap();
        engine.end_examination(t0 + Duration::from_secs(42)).unwrap();

        assert_eq!(engine.state(), SessionState::ExaminationEnded);
        let later = t0 + Duration::from_secs(300);
        assert_eq!(engine.elapsed(later), Duration::from_secs(42));
        assert_eq!(engine.remaining(later), Duration::from_secs(30 * 60 - 42));
    }

    #[tokio::test(start_paused = true)]
    async fn full_sitting_advances_through_every_student() {
        let mut engine = loaded(3, 30);
        let mut rng = StdRng::seed_from_u64(9);
        let t0 = Instant::now();

        for expected_order in 1..=3 {
            assert_eq!(engine.state(), SessionState::AwaitingQuestion);
            let student = engine.current_student().unwrap().clone();
            assert_eq!(student.exam_order, expected_order);

            let question = engine.draw_question(&mut rng).unwrap();
            engine.start_examination(t0).unwrap();
            engine.end_examination(t0 + Duration::from_secs(90)).unwrap();

            let result = engine.prepare_result(Grade::VeryGood, None).unwrap();
            assert_eq!(result.student_id, student.id);
            assert_eq!(result.question_number, question);
            assert_eq!(result.time_spent_secs, 90);
            assert_eq!(result.grade, 10);

            engine.advance_after_save(student.id);
        }

        assert_eq!(engine.state(), SessionState::AllStudentsComplete);
        assert!(engine.current_student().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_for_the_same_student_is_rejected() {
        let mut engine = loaded(1, 30);
        let mut rng = StdRng::seed_from_u64(3);
        let t0 = Instant::now();

        engine.draw_question(&mut rng).unwrap();
        engine.start_examination(t0).unwrap();
        engine.end_examination(t0 + Duration::from_secs(10)).unwrap();

        let result = engine.prepare_result(Grade::Fair, Some("hesitant".to_string())).unwrap();
        engine.advance_after_save(result.student_id);
        assert_eq!(engine.state(), SessionState::AllStudentsComplete);

        let err = engine.prepare_result(Grade::Fair, None).unwrap_err();
        assert_eq!(
            err,
            SessionError::InvalidTransition {
                action: "submit a grade",
                state: SessionState::AllStudentsComplete,
            }
        );
    }

    #[test]
    fn grade_scale_is_closed() {
        assert_eq!(Grade::from_value(7), Some(Grade::Good));
        assert_eq!(Grade::from_value(12), Some(Grade::Excellent));
        assert_eq!(Grade::from_value(5), None);
        assert_eq!(Grade::from_value(-3), None);
        assert_eq!(Grade::SCALE.map(Grade::value), [0, 2, 4, 7, 10, 12]);
    }

    #[test]
    fn blank_notes_are_stored_as_absent() {
        let graded = HashSet::new();
        let mut engine =
            SessionEngine::load(make_exam(5, 30), make_students(1), graded).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        engine.draw_question(&mut rng).unwrap();
        // Skip the clock; force the terminal-of-window state directly.
        engine.state = SessionState::ExaminationEnded;
        engine.elapsed_final = Some(Duration::from_secs(30));

        let result = engine.prepare_result(Grade::Adequate, Some("   ".to_string())).unwrap();
        assert_eq!(result.notes, None);
    }
}
