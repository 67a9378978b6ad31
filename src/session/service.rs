// src/session/service.rs

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::AppError;
use crate::session::engine::{Grade, SessionEngine, SessionError, SessionSnapshot, SessionState};
use crate::store::ExamStore;

/// The process-wide session slot. One exam sitting is active at a time.
///
/// Every mutation goes through the slot mutex, so clock ticks serialize
/// behind the same lock as user actions and can never observe a
/// half-applied transition. `generation` is bumped by every action that
/// supersedes a running clock; a ticker that wakes to a stale generation
/// exits without touching state.
#[derive(Default)]
struct Slot {
    engine: Option<SessionEngine>,
    generation: u64,
}

/// Drives the session engine: loads and reconciles sessions, runs the
/// once-per-second clock while an examination window is open, and owns
/// the validate -> persist -> advance grading flow.
#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn ExamStore>,
    slot: Arc<Mutex<Slot>>,
}

impl SessionService {
    pub fn new(store: Arc<dyn ExamStore>) -> Self {
        Self {
            store,
            slot: Arc::new(Mutex::new(Slot::default())),
        }
    }

    /// Loads an exam into the session slot, resuming where the persisted
    /// results left off.
    ///
    /// If every student already has a result but the exam's completion
    /// flag is still false (e.g. the flag write failed mid-sitting), the
    /// flag is repaired here before the session is reported terminal.
    pub async fn load_exam(&self, exam_id: i64) -> Result<SessionSnapshot, AppError> {
        let exam = self
            .store
            .get_exam(exam_id)
            .await?
            .ok_or(AppError::NotFound("Exam not found".to_string()))?;
        let students = self.store.list_students(exam_id).await?;
        let results = self.store.list_results(exam_id).await?;
        let graded: HashSet<i64> = results.iter().map(|r| r.student_id).collect();

        let mut engine = SessionEngine::load(exam, students, graded)?;

        if engine.state().is_terminal() && !engine.exam().is_completed {
            tracing::warn!("Exam {} has all results but no completion flag, repairing", exam_id);
            let when = Utc::now();
            let updated = self.store.mark_exam_completed(exam_id, when).await?;
            engine.mark_exam_completed(updated.completed_at.unwrap_or(when));
        }

        let mut slot = self.slot.lock().await;
        slot.generation += 1;
        let snapshot = engine.snapshot(Instant::now());
        slot.engine = Some(engine);

        tracing::info!("Loaded exam {} into session, state {}", exam_id, snapshot.state);
        Ok(snapshot)
    }

    /// Draws a question for the active student.
    pub async fn draw_question(&self) -> Result<SessionSnapshot, AppError> {
        let mut slot = self.slot.lock().await;
        let engine = slot.engine.as_mut().ok_or(SessionError::NoActiveSession)?;

        let question = engine.draw_question(&mut rand::thread_rng())?;
        tracing::info!("Drew question {} for student {:?}",
            question,
            engine.current_student().map(|s| s.id));

        Ok(engine.snapshot(Instant::now()))
    }

    /// Opens the examination window and starts the once-per-second clock.
    pub async fn start_examination(&self) -> Result<SessionSnapshot, AppError> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();

        let engine = slot.engine.as_mut().ok_or(SessionError::NoActiveSession)?;
        engine.start_examination(now)?;
        let snapshot = engine.snapshot(now);

        slot.generation += 1;
        let generation = slot.generation;
        drop(slot);

        self.spawn_ticker(generation);
        Ok(snapshot)
    }

    /// Manually closes the examination window.
    pub async fn end_examination(&self) -> Result<SessionSnapshot, AppError> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();

        let engine = slot.engine.as_mut().ok_or(SessionError::NoActiveSession)?;
        engine.end_examination(now)?;
        let snapshot = engine.snapshot(now);

        slot.generation += 1;
        Ok(snapshot)
    }

    /// Submits the grade for the current student: validate, persist the
    /// result, then advance to the next student or complete the exam.
    ///
    /// The slot lock is held across the whole flow, so no tick can
    /// interleave. If the result write fails the engine stays in
    /// `ExaminationEnded` and the submission can simply be retried; the
    /// result only counts once storage has confirmed it.
    pub async fn submit_grade(
        &self,
        grade_value: i64,
        notes: Option<String>,
    ) -> Result<SessionSnapshot, AppError> {
        let grade =
            Grade::from_value(grade_value).ok_or(SessionError::InvalidGrade(grade_value))?;

        let mut slot = self.slot.lock().await;

        let new_result = {
            let engine = slot.engine.as_mut().ok_or(SessionError::NoActiveSession)?;
            engine.prepare_result(grade, notes)?
        };
        // The window is closed at this point; any ticker still alive is
        // for a superseded clock.
        slot.generation += 1;

        let student_id = new_result.student_id;
        let saved = self
            .store
            .create_result(&new_result)
            .await
            .map_err(|e| match e {
                AppError::Conflict(msg) => AppError::Conflict(msg),
                other => AppError::InternalServerError(format!(
                    "Save result for student {} failed: {}",
                    student_id, other
                )),
            })?;

        let engine = slot.engine.as_mut().ok_or(SessionError::NoActiveSession)?;
        let state = engine.advance_after_save(saved.student_id);
        let exam_id = engine.exam().id;
        tracing::info!("Recorded grade {} for student {}, session now {}",
            saved.grade, saved.student_id, state);

        if state.is_terminal() {
            let when = Utc::now();
            match self.store.mark_exam_completed(exam_id, when).await {
                Ok(updated) => {
                    engine.mark_exam_completed(updated.completed_at.unwrap_or(when));
                    tracing::info!("Exam {} completed", exam_id);
                }
                Err(e) => {
                    // The result itself is saved; the flag is repaired on
                    // the next load.
                    tracing::warn!("Failed to set completion flag for exam {}: {}", exam_id, e);
                }
            }
        }

        Ok(engine.snapshot(Instant::now()))
    }

    /// Current session projection. Recomputes the clock from absolute
    /// instants, so an expired window is reported ended even if no tick
    /// has fired since.
    pub async fn snapshot(&self) -> Result<SessionSnapshot, AppError> {
        let mut slot = self.slot.lock().await;
        let engine = slot.engine.as_mut().ok_or(SessionError::NoActiveSession)?;

        let now = Instant::now();
        engine.tick(now);
        Ok(engine.snapshot(now))
    }

    /// One tokio task per examination window, relocking the slot on each
    /// tick. Exits as soon as the window is no longer running or the
    /// generation has moved on.
    fn spawn_ticker(&self, generation: u64) {
        let slot = Arc::clone(&self.slot);
        tokio::spawn(async move {
            let mut ticker = time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;

                let mut slot = slot.lock().await;
                if slot.generation != generation {
                    return;
                }
                let Some(engine) = slot.engine.as_mut() else {
                    return;
                };
                if engine.state() != SessionState::ExaminationRunning {
                    return;
                }
                if engine.tick(Instant::now()) {
                    tracing::info!("Examination window expired for exam {}", engine.exam().id);
                    return;
                }
            }
        });
    }
}
