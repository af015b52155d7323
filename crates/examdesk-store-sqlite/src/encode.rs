//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings so that text
//! order matches time order. Enums use their lowercase `strum` names.
//! Structured fields (answer keys, scope refs, id lists, summaries) are
//! compact JSON. UUIDs are hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use examdesk_core::{
  analysis::SessionResult,
  question::{AnswerKey, Question},
  roster::{Class, Membership, Student},
  session::{Attempt, Scope, ScopeRef, Session},
  taxonomy::{Chapter, SkillType},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_uuids(ids: &[Uuid]) -> Result<String> { Ok(serde_json::to_string(ids)?) }

pub fn decode_uuids(s: &str) -> Result<Vec<Uuid>> { Ok(serde_json::from_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Micros, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

/// Parse a `strum` enum column, naming the column on failure.
pub fn decode_enum<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::UnknownVariant { column, value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub struct RawChapter {
  pub chapter_id: String,
  pub subject:    String,
  pub code:       String,
  pub name:       String,
  pub book_key:   String,
  pub term:       String,
  pub sort_order: i64,
  pub active:     bool,
}

impl RawChapter {
  pub const COLUMNS: &'static str =
    "chapter_id, subject, code, name, book_key, term, sort_order, active";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      chapter_id: row.get(0)?,
      subject:    row.get(1)?,
      code:       row.get(2)?,
      name:       row.get(3)?,
      book_key:   row.get(4)?,
      term:       row.get(5)?,
      sort_order: row.get(6)?,
      active:     row.get(7)?,
    })
  }

  pub fn into_chapter(self) -> Result<Chapter> {
    Ok(Chapter {
      chapter_id: decode_uuid(&self.chapter_id)?,
      subject:    self.subject,
      code:       self.code,
      name:       self.name,
      book_key:   self.book_key,
      term:       decode_enum("term", &self.term)?,
      sort_order: self.sort_order,
      active:     self.active,
    })
  }
}

pub struct RawSkillType {
  pub type_id:    String,
  pub chapter_id: String,
  pub code:       String,
  pub name:       String,
  pub sort_order: i64,
  pub active:     bool,
}

impl RawSkillType {
  pub const COLUMNS: &'static str = "type_id, chapter_id, code, name, sort_order, active";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      type_id:    row.get(0)?,
      chapter_id: row.get(1)?,
      code:       row.get(2)?,
      name:       row.get(3)?,
      sort_order: row.get(4)?,
      active:     row.get(5)?,
    })
  }

  pub fn into_skill_type(self) -> Result<SkillType> {
    Ok(SkillType {
      type_id:    decode_uuid(&self.type_id)?,
      chapter_id: decode_uuid(&self.chapter_id)?,
      code:       self.code,
      name:       self.name,
      sort_order: self.sort_order,
      active:     self.active,
    })
  }
}

pub struct RawQuestion {
  pub question_id: String,
  pub chapter_id:  String,
  pub type_id:     String,
  pub difficulty:  String,
  pub prompt:      String,
  pub key_json:    String,
  pub active:      bool,
}

impl RawQuestion {
  pub const COLUMNS: &'static str =
    "question_id, chapter_id, type_id, difficulty, prompt, key_json, active";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      question_id: row.get(0)?,
      chapter_id:  row.get(1)?,
      type_id:     row.get(2)?,
      difficulty:  row.get(3)?,
      prompt:      row.get(4)?,
      key_json:    row.get(5)?,
      active:      row.get(6)?,
    })
  }

  pub fn into_question(self) -> Result<Question> {
    let key: AnswerKey = serde_json::from_str(&self.key_json)?;
    Ok(Question {
      question_id: decode_uuid(&self.question_id)?,
      chapter_id:  decode_uuid(&self.chapter_id)?,
      type_id:     decode_uuid(&self.type_id)?,
      difficulty:  decode_enum("difficulty", &self.difficulty)?,
      prompt:      self.prompt,
      key,
      active:      self.active,
    })
  }
}

pub struct RawStudent {
  pub student_id: String,
  pub name:       String,
  pub created_at: String,
}

impl RawStudent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self { student_id: row.get(0)?, name: row.get(1)?, created_at: row.get(2)? })
  }

  pub fn into_student(self) -> Result<Student> {
    Ok(Student {
      student_id: decode_uuid(&self.student_id)?,
      name:       self.name,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawClass {
  pub class_id:   String,
  pub name:       String,
  pub teacher_id: String,
  pub created_at: String,
}

impl RawClass {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      class_id:   row.get(0)?,
      name:       row.get(1)?,
      teacher_id: row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_class(self) -> Result<Class> {
    Ok(Class {
      class_id:   decode_uuid(&self.class_id)?,
      name:       self.name,
      teacher_id: decode_uuid(&self.teacher_id)?,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawMembership {
  pub class_id:   String,
  pub student_id: String,
  pub active:     bool,
  pub updated_at: String,
}

impl RawMembership {
  pub fn into_membership(self) -> Result<Membership> {
    Ok(Membership {
      class_id:   decode_uuid(&self.class_id)?,
      student_id: decode_uuid(&self.student_id)?,
      active:     self.active,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawSession {
  pub session_id:   String,
  pub kind:         String,
  pub student_id:   Option<String>,
  pub subject:      String,
  pub scope_type:   String,
  pub scope_ref:    String,
  pub question_ids: String,
  pub started_at:   String,
  pub ended_at:     Option<String>,
}

impl RawSession {
  pub const COLUMNS: &'static str = "session_id, kind, student_id, subject, scope_type, \
                                     scope_ref, question_ids, started_at, ended_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:   row.get(0)?,
      kind:         row.get(1)?,
      student_id:   row.get(2)?,
      subject:      row.get(3)?,
      scope_type:   row.get(4)?,
      scope_ref:    row.get(5)?,
      question_ids: row.get(6)?,
      started_at:   row.get(7)?,
      ended_at:     row.get(8)?,
    })
  }

  pub fn into_session(self) -> Result<Session> {
    let scope_ref: ScopeRef = serde_json::from_str(&self.scope_ref)?;
    Ok(Session {
      session_id:   decode_uuid(&self.session_id)?,
      kind:         decode_enum("kind", &self.kind)?,
      student_id:   self.student_id.as_deref().map(decode_uuid).transpose()?,
      scope:        Scope {
        subject: self.subject,
        scope_type: decode_enum("scope_type", &self.scope_type)?,
        scope_ref,
      },
      question_ids: decode_uuids(&self.question_ids)?,
      started_at:   decode_dt(&self.started_at)?,
      ended_at:     self.ended_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub struct RawAttempt {
  pub attempt_id:    String,
  pub session_id:    String,
  pub question_id:   String,
  pub chapter_id:    String,
  pub type_id:       String,
  pub difficulty:    String,
  pub qtype:         String,
  pub prompt:        String,
  pub answer_json:   String,
  pub is_correct:    bool,
  pub time_spent_ms: i64,
  pub recorded_at:   String,
}

impl RawAttempt {
  pub const COLUMNS: &'static str = "attempt_id, session_id, question_id, chapter_id, type_id, \
                                     difficulty, qtype, prompt, answer_json, is_correct, \
                                     time_spent_ms, recorded_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      attempt_id:    row.get(0)?,
      session_id:    row.get(1)?,
      question_id:   row.get(2)?,
      chapter_id:    row.get(3)?,
      type_id:       row.get(4)?,
      difficulty:    row.get(5)?,
      qtype:         row.get(6)?,
      prompt:        row.get(7)?,
      answer_json:   row.get(8)?,
      is_correct:    row.get(9)?,
      time_spent_ms: row.get(10)?,
      recorded_at:   row.get(11)?,
    })
  }

  pub fn into_attempt(self) -> Result<Attempt> {
    Ok(Attempt {
      attempt_id:    decode_uuid(&self.attempt_id)?,
      session_id:    decode_uuid(&self.session_id)?,
      question_id:   decode_uuid(&self.question_id)?,
      chapter_id:    decode_uuid(&self.chapter_id)?,
      type_id:       decode_uuid(&self.type_id)?,
      difficulty:    decode_enum("difficulty", &self.difficulty)?,
      qtype:         decode_enum("qtype", &self.qtype)?,
      prompt:        self.prompt,
      answer:        serde_json::from_str(&self.answer_json)?,
      is_correct:    self.is_correct,
      time_spent_ms: u64::try_from(self.time_spent_ms).unwrap_or_default(),
      recorded_at:   decode_dt(&self.recorded_at)?,
    })
  }
}

pub struct RawSessionResult {
  pub session_id:    String,
  pub overall_json:  String,
  pub chapters_json: String,
  pub analyzed_at:   String,
}

impl RawSessionResult {
  pub fn into_result(self) -> Result<SessionResult> {
    Ok(SessionResult {
      session_id:      decode_uuid(&self.session_id)?,
      overall_summary: serde_json::from_str(&self.overall_json)?,
      chapter_summary: serde_json::from_str(&self.chapters_json)?,
      analyzed_at:     decode_dt(&self.analyzed_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use examdesk_core::taxonomy::{Difficulty, Term};

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let b = a + chrono::Duration::milliseconds(1);
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn enum_columns() {
    assert_eq!(decode_enum::<Term>("term", "lower").unwrap(), Term::Lower);
    assert_eq!(Difficulty::Hard.as_ref(), "hard");
    assert!(matches!(
      decode_enum::<Difficulty>("difficulty", "brutal"),
      Err(Error::UnknownVariant { column: "difficulty", .. })
    ));
  }
}
