//! Loading students' diagnostic windows and the type catalog from the store.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use examdesk_core::{
  cohort::{SessionAttempts, StudentWindow, TypeCatalog, Window},
  identity::Identity,
  roster::{Class, Student},
  session::SessionKind,
  store::ExamStore,
};
use uuid::Uuid;

use crate::{ApiState, error::ApiError, fanout};

/// The class, if it exists and `identity` may see it. A class the caller
/// does not own is reported as missing.
pub async fn visible_class<S: ExamStore>(
  store: &S,
  class_id: Uuid,
  identity: Identity,
) -> Result<Class, ApiError> {
  store
    .get_class(class_id)
    .await
    .map_err(ApiError::store)?
    .filter(|class| identity.can_view_class(class))
    .ok_or_else(|| ApiError::NotFound(format!("class {class_id} not found")))
}

/// One student's qualifying sessions and their attempts.
pub async fn load_window<S: ExamStore>(
  store: &S,
  student: Student,
  window: Window,
  now: DateTime<Utc>,
) -> Result<StudentWindow, ApiError> {
  let candidates = store
    .list_student_sessions(student.student_id, SessionKind::Diagnostic, window.since(now))
    .await
    .map_err(ApiError::store)?;

  let mut sessions = Vec::new();
  for session in window.select(student.student_id, candidates, now) {
    let attempts = store.list_attempts(session.session_id).await.map_err(ApiError::store)?;
    sessions.push(SessionAttempts { session, attempts });
  }

  Ok(StudentWindow { student, sessions })
}

/// Every member's window, fetched with bounded concurrency, in roster order.
pub async fn load_windows<S>(
  state: &ApiState<S>,
  members: Vec<Student>,
  window: Window,
  now: DateTime<Utc>,
) -> Result<Vec<StudentWindow>, ApiError>
where
  S: ExamStore + 'static,
{
  fanout::bounded(members, state.fanout_concurrency, |student| {
    let store: Arc<S> = state.store.clone();
    async move { load_window(&*store, student, window, now).await }
  })
  .await
}

/// Labels and ordering for every type attempted in `windows`.
pub async fn catalog_for<S: ExamStore>(
  store: &S,
  windows: &[StudentWindow],
) -> Result<TypeCatalog, ApiError> {
  let type_ids: HashSet<Uuid> = windows
    .iter()
    .flat_map(|w| w.sessions.iter())
    .flat_map(|s| s.attempts.iter().map(|a| a.type_id))
    .collect();
  if type_ids.is_empty() {
    return Ok(TypeCatalog::default());
  }

  let types = store
    .get_skill_types(type_ids.into_iter().collect())
    .await
    .map_err(ApiError::store)?;
  let chapter_ids: HashSet<Uuid> = types.iter().map(|t| t.chapter_id).collect();
  let chapters = store
    .get_chapters(chapter_ids.into_iter().collect())
    .await
    .map_err(ApiError::store)?;

  Ok(TypeCatalog::new(types, chapters))
}
