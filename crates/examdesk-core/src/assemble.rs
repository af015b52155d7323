//! Diagnostic test assembly.
//!
//! The assembler is stateless: each call draws a fresh uniform sample from
//! the scope's question pool. Callers persist the sample in a session and
//! never call the assembler again for that session.

use std::collections::HashSet;

use rand::{Rng, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  policy::MAX_DIAGNOSTIC_QUESTIONS,
  scope::{ExamAllowlist, resolve_chapters},
  session::{Scope, ScopeRef},
  store::ExamStore,
};

/// An assembled question sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
  pub question_ids: Vec<Uuid>,
  /// True when fewer questions than requested were available.
  pub missing:      bool,
  /// The caller's scope reference plus the `missing` flag.
  pub scope_ref:    ScopeRef,
}

/// Reject a requested count outside `1..=MAX_DIAGNOSTIC_QUESTIONS`.
pub fn validate_count(count: usize) -> Result<usize> {
  if count == 0 {
    return Err(Error::validation("count", "must be at least 1"));
  }
  if count > MAX_DIAGNOSTIC_QUESTIONS {
    return Err(Error::validation(
      "count",
      format!("must be at most {MAX_DIAGNOSTIC_QUESTIONS}"),
    ));
  }
  Ok(count)
}

/// Deduplicate `pool`, shuffle it uniformly, and keep the first `count` ids.
///
/// Returns the sample and whether it fell short of `count`.
pub fn sample_ids<R: Rng + ?Sized>(
  pool: Vec<Uuid>,
  count: usize,
  rng: &mut R,
) -> (Vec<Uuid>, bool) {
  let mut seen = HashSet::with_capacity(pool.len());
  let mut ids: Vec<Uuid> = pool.into_iter().filter(|id| seen.insert(*id)).collect();
  ids.shuffle(rng);
  ids.truncate(count);
  let missing = ids.len() < count;
  (ids, missing)
}

/// Resolve `scope`, scan its active questions, and sample `count` of them.
pub async fn assemble_test<S: ExamStore>(
  store: &S,
  scope: &Scope,
  count: usize,
  allowlist: &ExamAllowlist,
) -> Result<Sample> {
  let count = validate_count(count)?;
  let chapter_ids = resolve_chapters(store, scope, allowlist).await?;

  let pool = if chapter_ids.is_empty() {
    Vec::new()
  } else {
    store
      .list_active_question_ids(chapter_ids)
      .await
      .map_err(Error::store)?
  };

  let (question_ids, missing) = sample_ids(pool, count, &mut rand::thread_rng());

  let mut scope_ref = scope.scope_ref.clone();
  scope_ref.insert("missing".into(), missing.into());

  Ok(Sample { question_ids, missing, scope_ref })
}
