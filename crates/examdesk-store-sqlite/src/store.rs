//! [`SqliteStore`]: the SQLite implementation of [`ExamStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, params_from_iter};
use tracing::debug;
use uuid::Uuid;

use examdesk_core::{
  analysis::SessionResult,
  question::{NewQuestion, Question},
  roster::{Class, Membership, Student},
  session::{Attempt, NewAttempt, NewSession, Session, SessionKind},
  store::ExamStore,
  taxonomy::{Chapter, Difficulty, NewChapter, NewSkillType, SkillType, Term},
};

use crate::{
  Error, Result,
  encode::{
    RawAttempt, RawChapter, RawClass, RawMembership, RawQuestion, RawSession,
    RawSessionResult, RawSkillType, RawStudent, encode_dt, encode_uuid, encode_uuids,
  },
  schema::SCHEMA,
};

/// `?, ?, ?` with `n` placeholders.
fn placeholders(n: usize) -> String { vec!["?"; n].join(", ") }

fn encode_all(ids: &[Uuid]) -> Vec<String> { ids.iter().copied().map(encode_uuid).collect() }

// ─── Store ───────────────────────────────────────────────────────────────────

/// An exam store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Number of stored result rows for a session.
  #[cfg(test)]
  pub(crate) async fn count_session_results(&self, session_id: Uuid) -> Result<i64> {
    let id_str = encode_uuid(session_id);
    Ok(
      self
        .conn
        .call(move |conn| {
          Ok(conn.query_row(
            "SELECT COUNT(*) FROM session_results WHERE session_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )?)
        })
        .await?,
    )
  }

  async fn query_chapters(&self, sql: String, args: Vec<String>) -> Result<Vec<Chapter>> {
    let raws: Vec<RawChapter> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawChapter::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawChapter::into_chapter).collect()
  }

  async fn query_questions(&self, sql: String, args: Vec<String>) -> Result<Vec<Question>> {
    let raws: Vec<RawQuestion> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawQuestion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawQuestion::into_question).collect()
  }
}

// ─── ExamStore impl ──────────────────────────────────────────────────────────

impl ExamStore for SqliteStore {
  type Error = Error;

  // ── Taxonomy ──────────────────────────────────────────────────────────────

  async fn add_chapter(&self, input: NewChapter) -> Result<Chapter> {
    let chapter = Chapter {
      chapter_id: Uuid::new_v4(),
      subject:    input.subject,
      code:       input.code,
      name:       input.name,
      book_key:   input.book_key,
      term:       input.term,
      sort_order: input.sort_order,
      active:     input.active,
    };

    let id_str = encode_uuid(chapter.chapter_id);
    let row = chapter.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO chapters (chapter_id, subject, code, name, book_key, term, sort_order, active)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            row.subject,
            row.code,
            row.name,
            row.book_key,
            row.term.as_ref(),
            row.sort_order,
            row.active,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(chapter)
  }

  async fn add_skill_type(&self, input: NewSkillType) -> Result<SkillType> {
    let skill = SkillType {
      type_id:    Uuid::new_v4(),
      chapter_id: input.chapter_id,
      code:       input.code,
      name:       input.name,
      sort_order: input.sort_order,
      active:     input.active,
    };

    let id_str = encode_uuid(skill.type_id);
    let chapter_str = encode_uuid(skill.chapter_id);
    let row = skill.clone();
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO skill_types (type_id, chapter_id, code, name, sort_order, active)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, chapter_str, row.code, row.name, row.sort_order, row.active],
        )?;
        Ok(())
      })
      .await?;

    Ok(skill)
  }

  async fn get_chapters(&self, ids: Vec<Uuid>) -> Result<Vec<Chapter>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {} FROM chapters WHERE chapter_id IN ({}) ORDER BY sort_order, code",
      RawChapter::COLUMNS,
      placeholders(ids.len())
    );
    self.query_chapters(sql, encode_all(&ids)).await
  }

  async fn list_book_chapters(&self, book_key: String, term: Term) -> Result<Vec<Chapter>> {
    let sql = format!(
      "SELECT {} FROM chapters
       WHERE book_key = ?1 AND term = ?2 AND active = 1
       ORDER BY sort_order, code",
      RawChapter::COLUMNS
    );
    self.query_chapters(sql, vec![book_key, term.as_ref().to_owned()]).await
  }

  async fn list_subject_chapters(&self, subject: String) -> Result<Vec<Chapter>> {
    let sql = format!(
      "SELECT {} FROM chapters WHERE subject = ?1 AND active = 1 ORDER BY sort_order, code",
      RawChapter::COLUMNS
    );
    self.query_chapters(sql, vec![subject]).await
  }

  async fn get_skill_types(&self, ids: Vec<Uuid>) -> Result<Vec<SkillType>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {} FROM skill_types WHERE type_id IN ({}) ORDER BY sort_order, code",
      RawSkillType::COLUMNS,
      placeholders(ids.len())
    );
    let args = encode_all(&ids);

    let raws: Vec<RawSkillType> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawSkillType::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSkillType::into_skill_type).collect()
  }

  // ── Questions ─────────────────────────────────────────────────────────────

  async fn add_question(&self, input: NewQuestion) -> Result<Question> {
    let question = Question {
      question_id: Uuid::new_v4(),
      chapter_id:  input.chapter_id,
      type_id:     input.type_id,
      difficulty:  input.difficulty,
      prompt:      input.prompt,
      key:         input.key,
      active:      input.active,
    };

    let id_str = encode_uuid(question.question_id);
    let chapter_str = encode_uuid(question.chapter_id);
    let type_str = encode_uuid(question.type_id);
    let difficulty = question.difficulty.as_ref().to_owned();
    let qtype = question.kind().as_ref().to_owned();
    let prompt = question.prompt.clone();
    let key_json = serde_json::to_string(&question.key)?;
    let active = question.active;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO questions
             (question_id, chapter_id, type_id, difficulty, qtype, prompt, key_json, active)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, chapter_str, type_str, difficulty, qtype, prompt, key_json, active,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(question)
  }

  async fn get_questions(&self, ids: Vec<Uuid>) -> Result<Vec<Question>> {
    if ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT {} FROM questions WHERE question_id IN ({})",
      RawQuestion::COLUMNS,
      placeholders(ids.len())
    );
    self.query_questions(sql, encode_all(&ids)).await
  }

  async fn list_active_question_ids(&self, chapter_ids: Vec<Uuid>) -> Result<Vec<Uuid>> {
    if chapter_ids.is_empty() {
      return Ok(Vec::new());
    }
    let sql = format!(
      "SELECT question_id FROM questions WHERE active = 1 AND chapter_id IN ({})",
      placeholders(chapter_ids.len())
    );
    let args = encode_all(&chapter_ids);

    let raws: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .iter()
      .map(|s| Uuid::parse_str(s).map_err(Error::Uuid))
      .collect()
  }

  async fn list_type_questions(
    &self,
    chapter_id: Uuid,
    type_id: Uuid,
    difficulty: Option<Difficulty>,
  ) -> Result<Vec<Question>> {
    let mut sql = format!(
      "SELECT {} FROM questions WHERE active = 1 AND chapter_id = ?1 AND type_id = ?2",
      RawQuestion::COLUMNS
    );
    let mut args = vec![encode_uuid(chapter_id), encode_uuid(type_id)];
    if let Some(d) = difficulty {
      sql.push_str(" AND difficulty = ?3");
      args.push(d.as_ref().to_owned());
    }
    self.query_questions(sql, args).await
  }

  // ── Roster ────────────────────────────────────────────────────────────────

  async fn add_student(&self, name: String) -> Result<Student> {
    let student = Student { student_id: Uuid::new_v4(), name, created_at: Utc::now() };

    let id_str = encode_uuid(student.student_id);
    let name = student.name.clone();
    let at_str = encode_dt(student.created_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO students (student_id, name, created_at) VALUES (?1, ?2, ?3)",
          rusqlite::params![id_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(student)
  }

  async fn get_student(&self, id: Uuid) -> Result<Option<Student>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawStudent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT student_id, name, created_at FROM students WHERE student_id = ?1",
              rusqlite::params![id_str],
              RawStudent::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawStudent::into_student).transpose()
  }

  async fn add_class(&self, name: String, teacher_id: Uuid) -> Result<Class> {
    let class = Class { class_id: Uuid::new_v4(), name, teacher_id, created_at: Utc::now() };

    let id_str = encode_uuid(class.class_id);
    let name = class.name.clone();
    let teacher_str = encode_uuid(teacher_id);
    let at_str = encode_dt(class.created_at);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO classes (class_id, name, teacher_id, created_at) VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![id_str, name, teacher_str, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(class)
  }

  async fn get_class(&self, id: Uuid) -> Result<Option<Class>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawClass> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT class_id, name, teacher_id, created_at FROM classes WHERE class_id = ?1",
              rusqlite::params![id_str],
              RawClass::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawClass::into_class).transpose()
  }

  async fn set_membership(
    &self,
    class_id: Uuid,
    student_id: Uuid,
    active: bool,
  ) -> Result<Membership> {
    let raw = RawMembership {
      class_id: encode_uuid(class_id),
      student_id: encode_uuid(student_id),
      active,
      updated_at: encode_dt(Utc::now()),
    };
    let (c, s, at) = (raw.class_id.clone(), raw.student_id.clone(), raw.updated_at.clone());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO memberships (class_id, student_id, active, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(class_id, student_id)
           DO UPDATE SET active = excluded.active, updated_at = excluded.updated_at",
          rusqlite::params![c, s, active, at],
        )?;
        Ok(())
      })
      .await?;

    raw.into_membership()
  }

  async fn list_class_members(&self, class_id: Uuid) -> Result<Vec<Student>> {
    let id_str = encode_uuid(class_id);

    let raws: Vec<RawStudent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.student_id, s.name, s.created_at
           FROM memberships m
           JOIN students s ON s.student_id = m.student_id
           WHERE m.class_id = ?1 AND m.active = 1
           ORDER BY s.name, s.student_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawStudent::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawStudent::into_student).collect()
  }

  async fn list_student_classes(&self, student_id: Uuid) -> Result<Vec<Class>> {
    let id_str = encode_uuid(student_id);

    let raws: Vec<RawClass> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT c.class_id, c.name, c.teacher_id, c.created_at
           FROM memberships m
           JOIN classes c ON c.class_id = m.class_id
           WHERE m.student_id = ?1 AND m.active = 1
           ORDER BY c.name, c.class_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawClass::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawClass::into_class).collect()
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn create_session(&self, input: NewSession) -> Result<Session> {
    let session = Session {
      session_id:   Uuid::new_v4(),
      kind:         input.kind,
      student_id:   input.student_id,
      scope:        input.scope,
      question_ids: input.question_ids,
      started_at:   input.started_at.unwrap_or_else(Utc::now),
      ended_at:     None,
    };

    let id_str = encode_uuid(session.session_id);
    let kind = session.kind.as_ref().to_owned();
    let student_str = session.student_id.map(encode_uuid);
    let subject = session.scope.subject.clone();
    let scope_type = session.scope.scope_type.as_ref().to_owned();
    let scope_ref = serde_json::to_string(&session.scope.scope_ref)?;
    let question_ids = encode_uuids(&session.question_ids)?;
    let started_str = encode_dt(session.started_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO sessions
             (session_id, kind, student_id, subject, scope_type, scope_ref, question_ids, started_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str, kind, student_str, subject, scope_type, scope_ref, question_ids, started_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    debug!(session_id = %session.session_id, kind = session.kind.as_ref(), "session created");
    Ok(session)
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
    let id_str = encode_uuid(id);
    let sql = format!("SELECT {} FROM sessions WHERE session_id = ?1", RawSession::COLUMNS);

    let raw: Option<RawSession> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id_str], RawSession::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSession::into_session).transpose()
  }

  async fn list_student_sessions(
    &self,
    student_id: Uuid,
    kind: SessionKind,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<Session>> {
    let mut sql = format!(
      "SELECT {} FROM sessions WHERE student_id = ?1 AND kind = ?2",
      RawSession::COLUMNS
    );
    let mut args = vec![encode_uuid(student_id), kind.as_ref().to_owned()];
    if let Some(since) = since {
      sql.push_str(" AND started_at >= ?3");
      args.push(encode_dt(since));
    }
    sql.push_str(" ORDER BY started_at DESC, session_id");

    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(params_from_iter(args), RawSession::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawSession::into_session).collect()
  }

  // ── Attempts ──────────────────────────────────────────────────────────────

  async fn submit_attempts(
    &self,
    session_id: Uuid,
    ended_at: DateTime<Utc>,
    input: Vec<NewAttempt>,
  ) -> Result<Option<Vec<Attempt>>> {
    let attempts: Vec<Attempt> = input
      .into_iter()
      .map(|a| Attempt {
        attempt_id: Uuid::new_v4(),
        session_id,
        question_id: a.question_id,
        chapter_id: a.chapter_id,
        type_id: a.type_id,
        difficulty: a.difficulty,
        qtype: a.qtype,
        prompt: a.prompt,
        answer: a.answer,
        is_correct: a.is_correct,
        time_spent_ms: a.time_spent_ms,
        recorded_at: ended_at,
      })
      .collect();

    let id_str = encode_uuid(session_id);
    let at_str = encode_dt(ended_at);
    let rows = attempts
      .iter()
      .map(|a| {
        Ok(RawAttempt {
          attempt_id:    encode_uuid(a.attempt_id),
          session_id:    id_str.clone(),
          question_id:   encode_uuid(a.question_id),
          chapter_id:    encode_uuid(a.chapter_id),
          type_id:       encode_uuid(a.type_id),
          difficulty:    a.difficulty.as_ref().to_owned(),
          qtype:         a.qtype.as_ref().to_owned(),
          prompt:        a.prompt.clone(),
          answer_json:   serde_json::to_string(&a.answer)?,
          is_correct:    a.is_correct,
          time_spent_ms: i64::try_from(a.time_spent_ms).unwrap_or(i64::MAX),
          recorded_at:   at_str.clone(),
        })
      })
      .collect::<Result<Vec<_>>>()?;

    let finished = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // Only an open session can be finished; losing this race writes
        // nothing.
        let changed = tx.execute(
          "UPDATE sessions SET ended_at = ?2 WHERE session_id = ?1 AND ended_at IS NULL",
          rusqlite::params![id_str, at_str],
        )?;
        if changed == 0 {
          return Ok(false);
        }
        {
          let mut stmt = tx.prepare(
            "INSERT INTO attempts (
               attempt_id, seq, session_id, question_id, chapter_id, type_id,
               difficulty, qtype, prompt, answer_json, is_correct, time_spent_ms, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
          )?;
          for (seq, row) in (1_i64..).zip(&rows) {
            stmt.execute(rusqlite::params![
              row.attempt_id,
              seq,
              row.session_id,
              row.question_id,
              row.chapter_id,
              row.type_id,
              row.difficulty,
              row.qtype,
              row.prompt,
              row.answer_json,
              row.is_correct,
              row.time_spent_ms,
              row.recorded_at,
            ])?;
          }
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    if !finished {
      debug!(session_id = %session_id, "submit refused: session missing or finished");
      return Ok(None);
    }
    debug!(session_id = %session_id, attempts = attempts.len(), "session finished");
    Ok(Some(attempts))
  }

  async fn list_attempts(&self, session_id: Uuid) -> Result<Vec<Attempt>> {
    let id_str = encode_uuid(session_id);
    let sql = format!(
      "SELECT {} FROM attempts WHERE session_id = ?1 ORDER BY seq",
      RawAttempt::COLUMNS
    );

    let raws: Vec<RawAttempt> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawAttempt::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAttempt::into_attempt).collect()
  }

  // ── Results ───────────────────────────────────────────────────────────────

  async fn upsert_session_result(&self, result: SessionResult) -> Result<()> {
    let id_str = encode_uuid(result.session_id);
    let overall_json = serde_json::to_string(&result.overall_summary)?;
    let chapters_json = serde_json::to_string(&result.chapter_summary)?;
    let at_str = encode_dt(result.analyzed_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO session_results (session_id, overall_json, chapters_json, analyzed_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(session_id) DO UPDATE SET
             overall_json  = excluded.overall_json,
             chapters_json = excluded.chapters_json,
             analyzed_at   = excluded.analyzed_at",
          rusqlite::params![id_str, overall_json, chapters_json, at_str],
        )?;
        Ok(())
      })
      .await?;

    debug!(session_id = %result.session_id, "session result stored");
    Ok(())
  }

  async fn get_session_result(&self, session_id: Uuid) -> Result<Option<SessionResult>> {
    let id_str = encode_uuid(session_id);

    let raw: Option<RawSessionResult> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT session_id, overall_json, chapters_json, analyzed_at
               FROM session_results WHERE session_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawSessionResult {
                  session_id:    row.get(0)?,
                  overall_json:  row.get(1)?,
                  chapters_json: row.get(2)?,
                  analyzed_at:   row.get(3)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawSessionResult::into_result).transpose()
  }
}
