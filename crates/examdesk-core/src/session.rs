//! Sessions, their scope descriptors, and graded attempts.
//!
//! A session is created once. The only later mutation is stamping `ended_at`
//! when answers are submitted. A diagnostic session carries the question ids
//! the assembler chose, and every later read of that session replays exactly
//! that list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};
use uuid::Uuid;

use crate::{question::QuestionKind, taxonomy::Difficulty};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SessionKind {
  Practice,
  Diagnostic,
}

// ─── Scope ───────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeType {
  /// A single chapter, `scopeRef.chapterId`.
  Chapter,
  /// A whole book, `scopeRef.grade` + `scopeRef.term`.
  Book,
  /// A subject's exam allowlist.
  Exam,
}

/// Free-form scope parameters, kept verbatim and echoed back to callers.
pub type ScopeRef = serde_json::Map<String, serde_json::Value>;

/// What a session draws its questions from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
  pub subject:    String,
  pub scope_type: ScopeType,
  #[serde(default)]
  pub scope_ref:  ScopeRef,
}

impl Scope {
  /// A single-chapter scope, optionally narrowed to one skill type.
  pub fn chapter(subject: impl Into<String>, chapter_id: Uuid, type_id: Option<Uuid>) -> Self {
    let mut scope_ref = ScopeRef::new();
    scope_ref.insert("chapterId".into(), chapter_id.to_string().into());
    if let Some(type_id) = type_id {
      scope_ref.insert("typeId".into(), type_id.to_string().into());
    }
    Self { subject: subject.into(), scope_type: ScopeType::Chapter, scope_ref }
  }

  /// A uuid stored under `key` in `scope_ref`, e.g. `chapterId`.
  pub fn ref_id(&self, key: &str) -> Option<Uuid> {
    self.scope_ref.get(key)?.as_str()?.trim().parse().ok()
  }
}

// ─── Session ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
  pub session_id:   Uuid,
  pub kind:         SessionKind,
  /// `None` for anonymous sessions.
  pub student_id:   Option<Uuid>,
  pub scope:        Scope,
  /// Materialized question order; empty for practice sessions.
  pub question_ids: Vec<Uuid>,
  pub started_at:   DateTime<Utc>,
  pub ended_at:     Option<DateTime<Utc>>,
}

impl Session {
  pub fn is_finished(&self) -> bool { self.ended_at.is_some() }
}

/// Input to [`crate::store::ExamStore::create_session`].
#[derive(Debug, Clone)]
pub struct NewSession {
  pub kind:         SessionKind,
  pub student_id:   Option<Uuid>,
  pub scope:        Scope,
  pub question_ids: Vec<Uuid>,
  /// Defaults to the store's clock when `None`.
  pub started_at:   Option<DateTime<Utc>>,
}

// ─── Attempts ────────────────────────────────────────────────────────────────

/// What the learner submitted: a choice index for `mcq`, text for `free`.
///
/// JSON integers read as [`Choice`](Self::Choice) and other JSON numbers as
/// [`Number`](Self::Number); a free-form question grades both by their
/// decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedAnswer {
  Choice(i64),
  Number(serde_json::Number),
  Text(String),
}

/// One graded answer. Write-once.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
  pub attempt_id:    Uuid,
  pub session_id:    Uuid,
  pub question_id:   Uuid,
  pub chapter_id:    Uuid,
  pub type_id:       Uuid,
  pub difficulty:    Difficulty,
  pub qtype:         QuestionKind,
  /// Prompt text as it was when answered.
  pub prompt:        String,
  pub answer:        SubmittedAnswer,
  pub is_correct:    bool,
  pub time_spent_ms: u64,
  pub recorded_at:   DateTime<Utc>,
}

/// Input to [`crate::store::ExamStore::submit_attempts`].
#[derive(Debug, Clone)]
pub struct NewAttempt {
  pub session_id:    Uuid,
  pub question_id:   Uuid,
  pub chapter_id:    Uuid,
  pub type_id:       Uuid,
  pub difficulty:    Difficulty,
  pub qtype:         QuestionKind,
  pub prompt:        String,
  pub answer:        SubmittedAnswer,
  pub is_correct:    bool,
  pub time_spent_ms: u64,
}
