//! Scope resolution: from a scope descriptor to the chapters it covers.
//!
//! Resolution never fails on bad input. A term or grade that does not
//! normalise, an unknown subject, or a malformed chapter id all resolve to an
//! empty chapter set; only store failures surface as errors.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{
  Error, Result,
  session::{Scope, ScopeType},
  store::ExamStore,
  taxonomy::{Chapter, Term},
};

// ─── Normalisation ───────────────────────────────────────────────────────────

/// Accepts `upper`/`lower` in any case and the localised `上`/`下` labels.
pub fn normalize_term(value: &Value) -> Option<Term> {
  let raw = value.as_str()?.trim();
  match raw.to_lowercase().as_str() {
    "upper" | "上" | "上學期" | "上学期" => Some(Term::Upper),
    "lower" | "下" | "下學期" | "下学期" => Some(Term::Lower),
    _ => None,
  }
}

/// Accepts a grade 1–3 as a JSON integer, a numeric string, or `一`/`二`/`三`.
pub fn normalize_grade(value: &Value) -> Option<u8> {
  let grade = match value {
    Value::Number(n) => n.as_u64()?,
    Value::String(s) => match s.trim() {
      "一" => 1,
      "二" => 2,
      "三" => 3,
      other => other.parse::<u64>().ok()?,
    },
    _ => return None,
  };
  (1..=3).contains(&grade).then_some(grade as u8)
}

/// Lowercase, trimmed subject key.
pub fn normalize_subject(subject: &str) -> String { subject.trim().to_lowercase() }

/// Canonical book key for a grade and subject, e.g. `1-math`.
pub fn book_key(grade: u8, subject: &str) -> String {
  format!("{grade}-{}", normalize_subject(subject))
}

// ─── Exam allowlist ──────────────────────────────────────────────────────────

/// Subject → chapter codes that an `exam` scope may draw from. Fixed per
/// deployment; loaded from configuration.
///
/// Subjects are normalised on the way in, however the allowlist is built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "HashMap<String, Vec<String>>")]
pub struct ExamAllowlist(HashMap<String, Vec<String>>);

impl From<HashMap<String, Vec<String>>> for ExamAllowlist {
  fn from(entries: HashMap<String, Vec<String>>) -> Self { Self::new(entries) }
}

impl ExamAllowlist {
  pub fn new(entries: HashMap<String, Vec<String>>) -> Self {
    Self(
      entries
        .into_iter()
        .map(|(subject, codes)| (normalize_subject(&subject), codes))
        .collect(),
    )
  }

  pub fn codes(&self, subject: &str) -> &[String] {
    self
      .0
      .get(&normalize_subject(subject))
      .map(Vec::as_slice)
      .unwrap_or_default()
  }
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// The store query a scope turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterQuery {
  /// Nothing to look up; resolves to no chapters.
  Empty,
  Direct(Uuid),
  Book { book_key: String, term: Term },
  Exam { subject: String, codes: Vec<String> },
}

/// Translate a scope into a [`ChapterQuery`] without touching the store.
pub fn plan(scope: &Scope, allowlist: &ExamAllowlist) -> ChapterQuery {
  let scope_ref = &scope.scope_ref;
  match scope.scope_type {
    ScopeType::Chapter => {
      scope.ref_id("chapterId").map_or(ChapterQuery::Empty, ChapterQuery::Direct)
    }
    ScopeType::Book => {
      let term = scope_ref.get("term").and_then(normalize_term);
      let grade = scope_ref.get("grade").and_then(normalize_grade);
      match (term, grade) {
        (Some(term), Some(grade)) => ChapterQuery::Book {
          book_key: book_key(grade, &scope.subject),
          term,
        },
        _ => ChapterQuery::Empty,
      }
    }
    ScopeType::Exam => {
      let codes = allowlist.codes(&scope.subject);
      if codes.is_empty() {
        ChapterQuery::Empty
      } else {
        ChapterQuery::Exam {
          subject: normalize_subject(&scope.subject),
          codes:   codes.to_vec(),
        }
      }
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Resolve a scope to an ordered, duplicate-free list of chapter ids.
pub async fn resolve_chapters<S: ExamStore>(
  store: &S,
  scope: &Scope,
  allowlist: &ExamAllowlist,
) -> Result<Vec<Uuid>> {
  let chapters: Vec<Chapter> = match plan(scope, allowlist) {
    ChapterQuery::Empty => return Ok(Vec::new()),
    ChapterQuery::Direct(id) => return Ok(vec![id]),
    ChapterQuery::Book { book_key, term } => store
      .list_book_chapters(book_key, term)
      .await
      .map_err(Error::store)?,
    ChapterQuery::Exam { subject, codes } => {
      let allowed: HashSet<String> = codes.into_iter().collect();
      store
        .list_subject_chapters(subject)
        .await
        .map_err(Error::store)?
        .into_iter()
        .filter(|c| allowed.contains(&c.code))
        .collect()
    }
  };

  Ok(ordered_ids(chapters))
}

/// Active chapters in sort order, deduplicated.
fn ordered_ids(mut chapters: Vec<Chapter>) -> Vec<Uuid> {
  chapters.retain(|c| c.active);
  chapters.sort_by(|a, b| {
    a.sort_order.cmp(&b.sort_order).then_with(|| a.code.cmp(&b.code))
  });
  let mut seen = HashSet::new();
  chapters
    .into_iter()
    .map(|c| c.chapter_id)
    .filter(|id| seen.insert(*id))
    .collect()
}
