//! Session analysis: grading a submitted batch and summarising attempts.
//!
//! Diagnostic sessions are broken down by chapter with a severity band per
//! chapter; practice sessions are broken down by skill type with a
//! remediation priority and the difficulty to try next. Both are pure
//! functions of the attempts; persistence is the caller's concern.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  evaluate::is_correct,
  policy::{self, Band},
  question::Question,
  session::{Attempt, NewAttempt, Session, SessionKind, SubmittedAnswer},
  taxonomy::Difficulty,
};

// ─── Output records ──────────────────────────────────────────────────────────

/// Totals over a set of attempts. `accuracy` is a percentage rounded to one
/// decimal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
  pub total:    u32,
  pub correct:  u32,
  pub accuracy: f64,
  pub score:    u32,
}

impl Summary {
  pub fn from_counts(correct: u32, total: u32) -> Self {
    let fraction = policy::ratio(correct, total);
    Self {
      total,
      correct,
      accuracy: policy::percent(fraction),
      score: policy::score(fraction),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRow {
  pub chapter_id: Uuid,
  pub total:      u32,
  pub correct:    u32,
  pub accuracy:   f64,
  pub severity:   Band,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRow {
  pub type_id:                Uuid,
  pub chapter_id:             Uuid,
  pub total:                  u32,
  pub correct:                u32,
  pub wrong:                  u32,
  pub accuracy:               f64,
  pub priority:               Band,
  pub recommended_difficulty: Difficulty,
}

/// Analysis of one session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalysis {
  pub session_id:      Uuid,
  pub kind:            SessionKind,
  pub overall_summary: Summary,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub chapter_summary: Option<Vec<ChapterRow>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub type_summary:    Option<Vec<TypeRow>>,
}

/// The persisted analysis of a diagnostic session. Exactly one per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
  pub session_id:      Uuid,
  pub overall_summary: Summary,
  pub chapter_summary: Vec<ChapterRow>,
  pub analyzed_at:     DateTime<Utc>,
}

// ─── Summaries ───────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub(crate) struct Tally {
  pub(crate) total:       u32,
  pub(crate) correct:     u32,
  pub(crate) missed_hard: bool,
}

impl Tally {
  pub(crate) fn add(&mut self, attempt: &Attempt) {
    self.total += 1;
    if attempt.is_correct {
      self.correct += 1;
    } else if attempt.difficulty == Difficulty::Hard {
      self.missed_hard = true;
    }
  }

  pub(crate) fn wrong(&self) -> u32 { self.total - self.correct }

  pub(crate) fn fraction(&self) -> f64 { policy::ratio(self.correct, self.total) }
}

/// Group attempts by `key`, preserving first-appearance order.
pub(crate) fn group_by<K, F>(attempts: &[Attempt], key: F) -> Vec<(K, Tally)>
where
  K: Copy + Eq + std::hash::Hash,
  F: Fn(&Attempt) -> K,
{
  let mut index: HashMap<K, usize> = HashMap::new();
  let mut groups: Vec<(K, Tally)> = Vec::new();
  for attempt in attempts {
    let k = key(attempt);
    let slot = *index.entry(k).or_insert_with(|| {
      groups.push((k, Tally::default()));
      groups.len() - 1
    });
    groups[slot].1.add(attempt);
  }
  groups
}

pub fn summarize(attempts: &[Attempt]) -> Summary {
  let correct = attempts.iter().filter(|a| a.is_correct).count() as u32;
  Summary::from_counts(correct, attempts.len() as u32)
}

/// Per-chapter totals with a severity band each.
pub fn chapter_breakdown(attempts: &[Attempt]) -> Vec<ChapterRow> {
  group_by(attempts, |a| a.chapter_id)
    .into_iter()
    .map(|(chapter_id, t)| ChapterRow {
      chapter_id,
      total: t.total,
      correct: t.correct,
      accuracy: policy::percent(t.fraction()),
      severity: policy::severity(t.fraction()),
    })
    .collect()
}

/// Per-type totals with remediation priority, most urgent first. Rows of equal
/// priority keep their first-appearance order.
pub fn type_breakdown(attempts: &[Attempt]) -> Vec<TypeRow> {
  let chapters: HashMap<Uuid, Uuid> =
    attempts.iter().map(|a| (a.type_id, a.chapter_id)).collect();

  let mut rows: Vec<TypeRow> = group_by(attempts, |a| a.type_id)
    .into_iter()
    .map(|(type_id, t)| {
      let (priority, recommended_difficulty) = policy::remediation(t.wrong(), t.missed_hard);
      TypeRow {
        type_id,
        chapter_id: chapters.get(&type_id).copied().unwrap_or_default(),
        total: t.total,
        correct: t.correct,
        wrong: t.wrong(),
        accuracy: policy::percent(t.fraction()),
        priority,
        recommended_difficulty,
      }
    })
    .collect();

  // `sort_by` is stable.
  rows.sort_by(|a, b| b.priority.cmp(&a.priority));
  rows
}

/// Analyse a session's attempts according to its kind.
pub fn analyze(session: &Session, attempts: &[Attempt]) -> SessionAnalysis {
  let overall_summary = summarize(attempts);
  let (chapter_summary, type_summary) = match session.kind {
    SessionKind::Diagnostic => (Some(chapter_breakdown(attempts)), None),
    SessionKind::Practice => (None, Some(type_breakdown(attempts))),
  };
  SessionAnalysis {
    session_id: session.session_id,
    kind: session.kind,
    overall_summary,
    chapter_summary,
    type_summary,
  }
}

impl SessionAnalysis {
  /// The row to persist for a diagnostic analysis; `None` for practice.
  pub fn to_result(&self, analyzed_at: DateTime<Utc>) -> Option<SessionResult> {
    let chapter_summary = self.chapter_summary.clone()?;
    Some(SessionResult {
      session_id: self.session_id,
      overall_summary: self.overall_summary.clone(),
      chapter_summary,
      analyzed_at,
    })
  }
}

// ─── Grading ─────────────────────────────────────────────────────────────────

/// One answer as submitted by a learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerSubmission {
  pub question_id:   Uuid,
  pub answer:        SubmittedAnswer,
  #[serde(default)]
  pub time_spent_ms: u64,
}

/// Per-answer outcome returned to the learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeOutcome {
  pub question_id: Uuid,
  pub is_correct:  bool,
}

/// A graded batch ready to persist.
#[derive(Debug, Clone)]
pub struct GradedBatch {
  pub attempts: Vec<NewAttempt>,
  pub outcomes: Vec<GradeOutcome>,
  /// Submissions dropped because their question was unknown or outside the
  /// session: not in a diagnostic's question list, or not in a practice
  /// session's chapter and skill type.
  pub skipped:  usize,
}

/// Grade `answers` for `session` against `questions`.
///
/// Rows that cannot be graded are counted in [`GradedBatch::skipped`] rather
/// than failing the batch. For a diagnostic session, repeated answers to the
/// same question keep only the first.
pub fn grade_batch(
  session: &Session,
  questions: &HashMap<Uuid, Question>,
  answers: Vec<AnswerSubmission>,
) -> GradedBatch {
  let mut attempts = Vec::with_capacity(answers.len());
  let mut outcomes = Vec::with_capacity(answers.len());
  let mut skipped = 0;
  let mut answered = std::collections::HashSet::new();
  let chapter = session.scope.ref_id("chapterId");
  let skill = session.scope.ref_id("typeId");

  for submission in answers {
    let Some(question) = questions.get(&submission.question_id) else {
      skipped += 1;
      continue;
    };
    let in_session = match session.kind {
      SessionKind::Diagnostic => {
        session.question_ids.contains(&question.question_id)
          && answered.insert(question.question_id)
      }
      SessionKind::Practice => {
        chapter.is_none_or(|id| id == question.chapter_id)
          && skill.is_none_or(|id| id == question.type_id)
      }
    };
    if !in_session {
      skipped += 1;
      continue;
    }

    let correct = is_correct(&submission.answer, &question.key);
    outcomes.push(GradeOutcome { question_id: question.question_id, is_correct: correct });
    attempts.push(NewAttempt {
      session_id:    session.session_id,
      question_id:   question.question_id,
      chapter_id:    question.chapter_id,
      type_id:       question.type_id,
      difficulty:    question.difficulty,
      qtype:         question.kind(),
      prompt:        question.prompt.clone(),
      answer:        submission.answer,
      is_correct:    correct,
      time_spent_ms: submission.time_spent_ms,
    });
  }

  GradedBatch { attempts, outcomes, skipped }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::{
    question::{AnswerKey, QuestionKind},
    session::{Scope, ScopeType},
  };

  pub(crate) fn attempt(chapter: Uuid, type_id: Uuid, difficulty: Difficulty, correct: bool) -> Attempt {
    Attempt {
      attempt_id:    Uuid::new_v4(),
      session_id:    Uuid::nil(),
      question_id:   Uuid::new_v4(),
      chapter_id:    chapter,
      type_id,
      difficulty,
      qtype:         QuestionKind::Free,
      prompt:        "p".into(),
      answer:        SubmittedAnswer::Text("x".into()),
      is_correct:    correct,
      time_spent_ms: 0,
      recorded_at:   Utc::now(),
    }
  }

  fn session(kind: SessionKind, question_ids: Vec<Uuid>) -> Session {
    Session {
      session_id: Uuid::new_v4(),
      kind,
      student_id: None,
      scope: Scope { subject: "math".into(), scope_type: ScopeType::Exam, scope_ref: Default::default() },
      question_ids,
      started_at: Utc::now(),
      ended_at: None,
    }
  }

  #[test]
  fn empty_session_has_zero_accuracy() {
    let s = summarize(&[]);
    assert_eq!(s, Summary { total: 0, correct: 0, accuracy: 0.0, score: 0 });
  }

  #[test]
  fn chapter_bands_at_the_thresholds() {
    let half = Uuid::new_v4();
    let eighty = Uuid::new_v4();
    let mut attempts = vec![
      attempt(half, Uuid::nil(), Difficulty::Easy, true),
      attempt(half, Uuid::nil(), Difficulty::Easy, false),
    ];
    for i in 0..5 {
      attempts.push(attempt(eighty, Uuid::nil(), Difficulty::Easy, i != 0));
    }

    let rows = chapter_breakdown(&attempts);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].chapter_id, half);
    assert_eq!(rows[0].accuracy, 50.0);
    assert_eq!(rows[0].severity, Band::Medium);
    assert_eq!(rows[1].accuracy, 80.0);
    assert_eq!(rows[1].severity, Band::Low);
  }

  #[test]
  fn type_rows_sorted_by_priority_stably() {
    let ch = Uuid::new_v4();
    let (none_wrong, one_wrong, two_wrong) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let attempts = vec![
      attempt(ch, none_wrong, Difficulty::Easy, true),
      attempt(ch, one_wrong, Difficulty::Easy, false),
      attempt(ch, two_wrong, Difficulty::Easy, false),
      attempt(ch, two_wrong, Difficulty::Medium, false),
      attempt(ch, one_wrong, Difficulty::Easy, true),
    ];

    let rows = type_breakdown(&attempts);
    let order: Vec<_> = rows.iter().map(|r| (r.type_id, r.priority)).collect();
    assert_eq!(order, vec![
      (two_wrong, Band::High),
      (one_wrong, Band::Medium),
      (none_wrong, Band::Low),
    ]);
    assert_eq!(rows[0].recommended_difficulty, Difficulty::Easy);
    assert_eq!(rows[1].recommended_difficulty, Difficulty::Medium);
    assert_eq!(rows[2].recommended_difficulty, Difficulty::Hard);
  }

  #[test]
  fn equal_priorities_keep_grouping_order() {
    let ch = Uuid::new_v4();
    let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
    let attempts = vec![
      attempt(ch, a, Difficulty::Easy, false),
      attempt(ch, b, Difficulty::Hard, false),
      attempt(ch, b, Difficulty::Easy, true),
      attempt(ch, c, Difficulty::Easy, false),
    ];
    let ids: Vec<_> = type_breakdown(&attempts).iter().map(|r| r.type_id).collect();
    assert_eq!(ids, vec![a, b, c]);
  }

  #[test]
  fn analysis_shape_follows_kind() {
    let ch = Uuid::new_v4();
    let attempts = vec![attempt(ch, Uuid::new_v4(), Difficulty::Easy, true)];

    let diag = analyze(&session(SessionKind::Diagnostic, vec![]), &attempts);
    assert!(diag.chapter_summary.is_some() && diag.type_summary.is_none());
    assert!(diag.to_result(Utc::now()).is_some());

    let practice = analyze(&session(SessionKind::Practice, vec![]), &attempts);
    assert!(practice.chapter_summary.is_none() && practice.type_summary.is_some());
    assert!(practice.to_result(Utc::now()).is_none());
  }

  #[test]
  fn grading_skips_unknown_and_foreign_questions() {
    let known = Question {
      question_id: Uuid::new_v4(),
      chapter_id:  Uuid::new_v4(),
      type_id:     Uuid::new_v4(),
      difficulty:  Difficulty::Medium,
      prompt:      "How many grams in a kilogram?".into(),
      key:         AnswerKey::Free { answer: "1000".into() },
      active:      true,
    };
    let outside = Question { question_id: Uuid::new_v4(), ..known.clone() };
    let questions = HashMap::from([
      (known.question_id, known.clone()),
      (outside.question_id, outside.clone()),
    ]);
    let s = session(SessionKind::Diagnostic, vec![known.question_id]);

    let submit = |id: Uuid, text: &str| AnswerSubmission {
      question_id:   id,
      answer:        SubmittedAnswer::Text(text.into()),
      time_spent_ms: 1500,
    };
    let batch = grade_batch(&s, &questions, vec![
      submit(known.question_id, "1,000"),
      submit(Uuid::new_v4(), "1"),
      submit(outside.question_id, "1000"),
      submit(known.question_id, "2"),
    ]);

    assert_eq!(batch.skipped, 3);
    assert_eq!(batch.outcomes, vec![GradeOutcome { question_id: known.question_id, is_correct: true }]);
    assert_eq!(batch.attempts[0].prompt, known.prompt);
    assert_eq!(batch.attempts[0].time_spent_ms, 1500);
  }

  #[test]
  fn practice_grading_stays_inside_the_scope() {
    let question = |chapter_id: Uuid, type_id: Uuid| Question {
      question_id: Uuid::new_v4(),
      chapter_id,
      type_id,
      difficulty: Difficulty::Easy,
      prompt: "2 + 2 = ?".into(),
      key: AnswerKey::Free { answer: "4".into() },
      active: true,
    };
    let (chapter, skill) = (Uuid::new_v4(), Uuid::new_v4());
    let inside = question(chapter, skill);
    let other_type = question(chapter, Uuid::new_v4());
    let other_chapter = question(Uuid::new_v4(), skill);
    let questions: HashMap<Uuid, Question> = [&inside, &other_type, &other_chapter]
      .into_iter()
      .map(|q| (q.question_id, q.clone()))
      .collect();
    let submit = |q: &Question| AnswerSubmission {
      question_id:   q.question_id,
      answer:        SubmittedAnswer::Choice(4),
      time_spent_ms: 0,
    };
    let all = || vec![submit(&inside), submit(&other_type), submit(&other_chapter)];

    let mut s = session(SessionKind::Practice, vec![]);
    s.scope = Scope::chapter("math", chapter, Some(skill));
    let batch = grade_batch(&s, &questions, all());
    assert_eq!(batch.skipped, 2);
    assert_eq!(batch.outcomes, vec![GradeOutcome { question_id: inside.question_id, is_correct: true }]);

    s.scope = Scope::chapter("math", chapter, None);
    let batch = grade_batch(&s, &questions, all());
    assert_eq!(batch.skipped, 1);
    assert_eq!(batch.attempts.len(), 2);
  }
}
