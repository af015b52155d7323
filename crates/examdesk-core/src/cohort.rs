//! Class-level aggregation over students' diagnostic sessions.
//!
//! Input is one [`StudentWindow`] per active class member: the student plus
//! their qualifying sessions within the chosen [`Window`], each with its
//! attempts. Fetching those windows is the caller's job; everything in this
//! module is a pure function of them. A member with no qualifying session is
//! still reported, with `has_report = false`.

use std::{cmp::Ordering, collections::HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  analysis::{Tally, group_by},
  policy::{self, Band, TOP_WEAK_TYPES, TRAILING_WINDOW_DAYS},
  roster::Student,
  session::{Attempt, Session, SessionKind},
  taxonomy::{Chapter, Difficulty, SkillType},
};

// ─── Window ──────────────────────────────────────────────────────────────────

/// Which of a student's diagnostic sessions count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Window {
  /// Only the most recent qualifying session.
  #[default]
  #[serde(rename = "latest")]
  Latest,
  /// Every qualifying session started in the trailing 30 days.
  #[serde(rename = "30d")]
  Last30Days,
}

impl Window {
  /// Earliest `started_at` a session may have to count, if bounded.
  pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match self {
      Self::Latest => None,
      Self::Last30Days => Some(now - Duration::days(TRAILING_WINDOW_DAYS)),
    }
  }

  /// Keep the sessions that qualify: finished diagnostics owned by
  /// `student_id`, inside the window. The result is newest first.
  pub fn select(
    self,
    student_id: Uuid,
    mut sessions: Vec<Session>,
    now: DateTime<Utc>,
  ) -> Vec<Session> {
    let since = self.since(now);
    sessions.retain(|s| {
      s.kind == SessionKind::Diagnostic
        && s.student_id == Some(student_id)
        && s.is_finished()
        && since.is_none_or(|t| s.started_at >= t)
    });
    sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    if self == Self::Latest {
      sessions.truncate(1);
    }
    sessions
  }
}

// ─── Input ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SessionAttempts {
  pub session:  Session,
  pub attempts: Vec<Attempt>,
}

/// A class member and their qualifying sessions, newest first.
#[derive(Debug, Clone)]
pub struct StudentWindow {
  pub student:  Student,
  pub sessions: Vec<SessionAttempts>,
}

/// One student's standing on one skill type across their window.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentTypeStat {
  pub type_id:     Uuid,
  /// Mean of per-session accuracy fractions over sessions containing the type.
  pub accuracy:    f64,
  /// Wrong answers summed over the window.
  pub wrong:       u32,
  pub missed_hard: bool,
}

impl StudentWindow {
  pub fn has_report(&self) -> bool { !self.sessions.is_empty() }

  pub fn latest_session_at(&self) -> Option<DateTime<Utc>> {
    self.sessions.iter().map(|s| s.session.started_at).max()
  }

  /// Mean of per-session overall accuracy fractions.
  pub fn overall_accuracy(&self) -> Option<f64> {
    if self.sessions.is_empty() {
      return None;
    }
    let sum: f64 = self
      .sessions
      .iter()
      .map(|s| {
        let correct = s.attempts.iter().filter(|a| a.is_correct).count() as u32;
        policy::ratio(correct, s.attempts.len() as u32)
      })
      .sum();
    Some(sum / self.sessions.len() as f64)
  }

  /// Per-type standing, in first-appearance order.
  pub fn type_stats(&self) -> Vec<StudentTypeStat> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut acc: HashMap<Uuid, (f64, u32, Tally)> = HashMap::new();

    for session in &self.sessions {
      for (type_id, tally) in group_by(&session.attempts, |a| a.type_id) {
        let entry = acc.entry(type_id).or_insert_with(|| {
          order.push(type_id);
          (0.0, 0, Tally::default())
        });
        entry.0 += tally.fraction();
        entry.1 += 1;
        entry.2.total += tally.total;
        entry.2.correct += tally.correct;
        entry.2.missed_hard |= tally.missed_hard;
      }
    }

    order
      .into_iter()
      .filter_map(|type_id| {
        let (sum, sessions, tally) = acc.remove(&type_id)?;
        Some(StudentTypeStat {
          type_id,
          accuracy: sum / f64::from(sessions),
          wrong: tally.wrong(),
          missed_hard: tally.missed_hard,
        })
      })
      .collect()
  }
}

// ─── Type catalog ────────────────────────────────────────────────────────────

/// Names and display order for skill types.
#[derive(Debug, Clone, Default)]
pub struct TypeCatalog {
  types:          HashMap<Uuid, SkillType>,
  chapter_orders: HashMap<Uuid, i64>,
}

impl TypeCatalog {
  pub fn new(types: Vec<SkillType>, chapters: Vec<Chapter>) -> Self {
    Self {
      types:          types.into_iter().map(|t| (t.type_id, t)).collect(),
      chapter_orders: chapters.into_iter().map(|c| (c.chapter_id, c.sort_order)).collect(),
    }
  }

  /// `(code, name)`; an uncatalogued type is labelled by its id.
  pub fn label(&self, type_id: Uuid) -> (String, String) {
    match self.types.get(&type_id) {
      Some(t) => (t.code.clone(), t.name.clone()),
      None => (type_id.to_string(), String::new()),
    }
  }

  /// Chapter order, then type order, then code. Uncatalogued types sort last.
  pub fn compare(&self, a: Uuid, b: Uuid) -> Ordering {
    self.sort_key(a).cmp(&self.sort_key(b))
  }

  fn sort_key(&self, type_id: Uuid) -> (i64, i64, String) {
    match self.types.get(&type_id) {
      Some(t) => (
        self.chapter_orders.get(&t.chapter_id).copied().unwrap_or(i64::MAX),
        t.sort_order,
        t.code.clone(),
      ),
      None => (i64::MAX, i64::MAX, type_id.to_string()),
    }
  }
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Class-wide standing on one skill type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassTypeRow {
  pub type_id:       Uuid,
  pub code:          String,
  pub name:          String,
  /// Percentage, one decimal.
  pub mean_accuracy: f64,
  /// Students whose accuracy on the type is below the `medium` threshold.
  pub weak_count:    u32,
  pub mean_wrong:    f64,
  pub severity:      Band,
  /// Students who attempted the type.
  pub students:      u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
  pub student_id:        Uuid,
  pub name:              String,
  pub has_report:        bool,
  /// Percentage, one decimal; `None` without a report.
  pub accuracy:          Option<f64>,
  pub latest_session_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CohortReport {
  pub class_id:               Uuid,
  pub window:                 Window,
  pub class_summary_by_type:  Vec<ClassTypeRow>,
  pub top_weak_types:         Vec<ClassTypeRow>,
  pub students:               Vec<RosterEntry>,
}

// ─── Aggregation ─────────────────────────────────────────────────────────────

pub fn roster_entry(member: &StudentWindow) -> RosterEntry {
  RosterEntry {
    student_id:        member.student.student_id,
    name:              member.student.name.clone(),
    has_report:        member.has_report(),
    accuracy:          member.overall_accuracy().map(policy::percent),
    latest_session_at: member.latest_session_at(),
  }
}

/// Roll every member's window up into a class report.
pub fn aggregate(
  class_id: Uuid,
  window: Window,
  members: &[StudentWindow],
  catalog: &TypeCatalog,
) -> CohortReport {
  let mut per_type: HashMap<Uuid, Vec<StudentTypeStat>> = HashMap::new();
  for member in members {
    for stat in member.type_stats() {
      per_type.entry(stat.type_id).or_default().push(stat);
    }
  }

  let mut rows: Vec<(f64, ClassTypeRow)> = per_type
    .into_iter()
    .map(|(type_id, stats)| {
      let n = stats.len() as f64;
      let mean = stats.iter().map(|s| s.accuracy).sum::<f64>() / n;
      let mean_wrong = stats.iter().map(|s| f64::from(s.wrong)).sum::<f64>() / n;
      let (code, name) = catalog.label(type_id);
      let row = ClassTypeRow {
        type_id,
        code,
        name,
        mean_accuracy: policy::percent(mean),
        weak_count: stats.iter().filter(|s| policy::is_weak(s.accuracy)).count() as u32,
        mean_wrong: policy::round1(mean_wrong),
        severity: policy::severity(mean),
        students: stats.len() as u32,
      };
      (mean, row)
    })
    .collect();

  rows.sort_by(|a, b| catalog.compare(a.1.type_id, b.1.type_id));

  let mut ranked: Vec<&(f64, ClassTypeRow)> = rows.iter().collect();
  ranked.sort_by(|a, b| a.0.total_cmp(&b.0));
  let top_weak_types = ranked
    .into_iter()
    .take(TOP_WEAK_TYPES)
    .map(|(_, row)| row.clone())
    .collect();

  CohortReport {
    class_id,
    window,
    class_summary_by_type: rows.into_iter().map(|(_, row)| row).collect(),
    top_weak_types,
    students: members.iter().map(roster_entry).collect(),
  }
}

// ─── Single-student report ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentTypeRow {
  pub type_id:                Uuid,
  pub code:                   String,
  pub name:                   String,
  pub accuracy:               f64,
  pub wrong:                  u32,
  pub severity:               Band,
  pub priority:               Band,
  pub recommended_difficulty: Difficulty,
}

/// One student's weaknesses over a window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentReport {
  #[serde(flatten)]
  pub summary: RosterEntry,
  pub window:  Window,
  /// Most urgent first; ties in catalog order.
  pub types:   Vec<StudentTypeRow>,
}

pub fn student_report(window: Window, member: &StudentWindow, catalog: &TypeCatalog) -> StudentReport {
  let mut types: Vec<StudentTypeRow> = member
    .type_stats()
    .into_iter()
    .map(|stat| {
      let (code, name) = catalog.label(stat.type_id);
      let (priority, recommended_difficulty) = policy::remediation(stat.wrong, stat.missed_hard);
      StudentTypeRow {
        type_id: stat.type_id,
        code,
        name,
        accuracy: policy::percent(stat.accuracy),
        wrong: stat.wrong,
        severity: policy::severity(stat.accuracy),
        priority,
        recommended_difficulty,
      }
    })
    .collect();

  types.sort_by(|a, b| catalog.compare(a.type_id, b.type_id));
  types.sort_by(|a, b| b.priority.cmp(&a.priority));

  StudentReport { summary: roster_entry(member), window, types }
}
