//! The `ExamStore` trait.
//!
//! Implemented by storage backends (e.g. `examdesk-store-sqlite`). The
//! pipeline and the HTTP layer depend on this abstraction only. Backends
//! surface failures through their associated error type; nothing here
//! retries.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  analysis::SessionResult,
  question::{NewQuestion, Question},
  roster::{Class, Membership, Student},
  session::{Attempt, NewAttempt, NewSession, Session, SessionKind},
  taxonomy::{Chapter, Difficulty, NewChapter, NewSkillType, SkillType, Term},
};

/// Abstraction over the relational store backing the exam pipeline.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait ExamStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Taxonomy ──────────────────────────────────────────────────────────

  fn add_chapter(
    &self,
    input: NewChapter,
  ) -> impl Future<Output = Result<Chapter, Self::Error>> + Send + '_;

  fn add_skill_type(
    &self,
    input: NewSkillType,
  ) -> impl Future<Output = Result<SkillType, Self::Error>> + Send + '_;

  /// Chapters by id, active or not. Unknown ids are skipped.
  fn get_chapters(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Chapter>, Self::Error>> + Send + '_;

  /// Active chapters of one book and term, in sort order.
  fn list_book_chapters(
    &self,
    book_key: String,
    term: Term,
  ) -> impl Future<Output = Result<Vec<Chapter>, Self::Error>> + Send + '_;

  /// Active chapters of one subject, in sort order.
  fn list_subject_chapters(
    &self,
    subject: String,
  ) -> impl Future<Output = Result<Vec<Chapter>, Self::Error>> + Send + '_;

  /// Skill types by id, active or not. Unknown ids are skipped.
  fn get_skill_types(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<SkillType>, Self::Error>> + Send + '_;

  // ── Questions ─────────────────────────────────────────────────────────

  fn add_question(
    &self,
    input: NewQuestion,
  ) -> impl Future<Output = Result<Question, Self::Error>> + Send + '_;

  /// Questions by id, active or not. Unknown ids are skipped.
  fn get_questions(
    &self,
    ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Question>, Self::Error>> + Send + '_;

  /// Ids of every active question in any of `chapter_ids`.
  fn list_active_question_ids(
    &self,
    chapter_ids: Vec<Uuid>,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Active questions of one chapter and type, optionally one difficulty.
  fn list_type_questions(
    &self,
    chapter_id: Uuid,
    type_id: Uuid,
    difficulty: Option<Difficulty>,
  ) -> impl Future<Output = Result<Vec<Question>, Self::Error>> + Send + '_;

  // ── Roster ────────────────────────────────────────────────────────────

  fn add_student(
    &self,
    name: String,
  ) -> impl Future<Output = Result<Student, Self::Error>> + Send + '_;

  fn get_student(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Student>, Self::Error>> + Send + '_;

  fn add_class(
    &self,
    name: String,
    teacher_id: Uuid,
  ) -> impl Future<Output = Result<Class, Self::Error>> + Send + '_;

  fn get_class(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Class>, Self::Error>> + Send + '_;

  /// Insert or update the membership of `student_id` in `class_id`.
  fn set_membership(
    &self,
    class_id: Uuid,
    student_id: Uuid,
    active: bool,
  ) -> impl Future<Output = Result<Membership, Self::Error>> + Send + '_;

  /// Students with an active membership in `class_id`, by name then id.
  fn list_class_members(
    &self,
    class_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Student>, Self::Error>> + Send + '_;

  /// Classes in which `student_id` has an active membership.
  fn list_student_classes(
    &self,
    student_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  fn create_session(
    &self,
    input: NewSession,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  fn get_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// A student's sessions of one kind, newest `started_at` first.
  ///
  /// - `since`: only sessions started at or after this instant.
  fn list_student_sessions(
    &self,
    student_id: Uuid,
    kind: SessionKind,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<Session>, Self::Error>> + Send + '_;

  // ── Attempts ──────────────────────────────────────────────────────────

  /// Record a session's answers and stamp its `ended_at` in one
  /// transaction. This is the only mutation a session ever receives.
  ///
  /// Returns `None`, writing nothing, when the session does not exist or
  /// was already finished. `attempt_id` is assigned by the store and
  /// `recorded_at` is `ended_at`.
  fn submit_attempts(
    &self,
    session_id: Uuid,
    ended_at: DateTime<Utc>,
    input: Vec<NewAttempt>,
  ) -> impl Future<Output = Result<Option<Vec<Attempt>>, Self::Error>> + Send + '_;

  /// All attempts of a session in recording order.
  fn list_attempts(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Attempt>, Self::Error>> + Send + '_;

  // ── Results ───────────────────────────────────────────────────────────

  /// Insert or replace the result row keyed by `result.session_id`.
  fn upsert_session_result(
    &self,
    result: SessionResult,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_session_result(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<SessionResult>, Self::Error>> + Send + '_;
}
