//! Handlers for `/sessions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sessions/{id}` | The session with its question snapshot |
//! | `GET`  | `/sessions/{id}/questions` | Question views in snapshot order |
//! | `POST` | `/sessions/{id}/submit` | Grade, record, finish, analyse |
//! | `POST` | `/sessions/{id}/analyze` | Re-analyse stored attempts |
//! | `GET`  | `/sessions/{id}/result` | Stored diagnostic result |
//!
//! A session the caller may not see is reported as missing.

use std::{collections::HashMap, sync::Arc};

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::Utc;
use examdesk_core::{
  analysis::{
    self, AnswerSubmission, GradeOutcome, SessionAnalysis, SessionResult, grade_batch,
  },
  policy::MAX_DIAGNOSTIC_QUESTIONS,
  question::{Question, QuestionView},
  session::{Session, SessionKind},
  store::ExamStore,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{ApiState, caller::Caller, error::ApiError};

async fn visible_session<S: ExamStore>(
  store: &S,
  id: Uuid,
  caller: Caller,
) -> Result<Session, ApiError> {
  store
    .get_session(id)
    .await
    .map_err(ApiError::store)?
    .filter(|s| caller.0.can_view_session(s.student_id))
    .ok_or_else(|| ApiError::NotFound(format!("session {id} not found")))
}

/// Analyse `session` over everything stored for it and persist the result
/// when it is a diagnostic.
async fn analyze_and_store<S: ExamStore>(
  store: &S,
  session: &Session,
) -> Result<SessionAnalysis, ApiError> {
  let attempts = store.list_attempts(session.session_id).await.map_err(ApiError::store)?;
  let analysis = analysis::analyze(session, &attempts);
  if let Some(result) = analysis.to_result(Utc::now()) {
    store.upsert_session_result(result).await.map_err(ApiError::store)?;
  }
  Ok(analysis)
}

// ─── Reads ───────────────────────────────────────────────────────────────────

/// `GET /sessions/{id}`
pub async fn get_one<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Session>, ApiError>
where
  S: ExamStore + 'static,
{
  Ok(Json(visible_session(&*state.store, id, caller).await?))
}

/// `GET /sessions/{id}/questions`
pub async fn questions<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<QuestionView>>, ApiError>
where
  S: ExamStore + 'static,
{
  let session = visible_session(&*state.store, id, caller).await?;
  let by_id: HashMap<Uuid, Question> = state
    .store
    .get_questions(session.question_ids.clone())
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|q| (q.question_id, q))
    .collect();

  let views = session
    .question_ids
    .iter()
    .filter_map(|id| by_id.get(id).map(Question::view))
    .collect();
  Ok(Json(views))
}

/// `GET /sessions/{id}/result`
pub async fn result<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionResult>, ApiError>
where
  S: ExamStore + 'static,
{
  visible_session(&*state.store, id, caller).await?;
  let result = state
    .store
    .get_session_result(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("no result for session {id}")))?;
  Ok(Json(result))
}

// ─── Submit ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
  pub answers: Vec<AnswerSubmission>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
  pub analysis: SessionAnalysis,
  pub results:  Vec<GradeOutcome>,
  /// Answers that could not be graded and were dropped.
  pub skipped:  usize,
}

fn already_submitted() -> ApiError {
  ApiError::Validation { field: "sessionId", message: "session already submitted".into() }
}

/// `POST /sessions/{id}/submit`
#[tracing::instrument(skip_all, fields(session_id = %id, answers = body.answers.len()))]
pub async fn submit<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<SubmitBody>,
) -> Result<Json<SubmitResponse>, ApiError>
where
  S: ExamStore + 'static,
{
  caller.require_participant()?;
  let session = visible_session(&*state.store, id, caller).await?;
  if session.is_finished() {
    return Err(already_submitted());
  }
  if body.answers.is_empty() {
    return Err(ApiError::Validation { field: "answers", message: "no answers".into() });
  }
  let limit = match session.kind {
    SessionKind::Diagnostic => session.question_ids.len(),
    SessionKind::Practice => MAX_DIAGNOSTIC_QUESTIONS,
  };
  if body.answers.len() > limit {
    return Err(ApiError::Validation {
      field:   "answers",
      message: format!("at most {limit} answers per submission"),
    });
  }

  let mut wanted: Vec<Uuid> = body.answers.iter().map(|a| a.question_id).collect();
  wanted.sort_unstable();
  wanted.dedup();
  let questions: HashMap<Uuid, Question> = state
    .store
    .get_questions(wanted)
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .map(|q| (q.question_id, q))
    .collect();

  let graded = grade_batch(&session, &questions, body.answers);
  if graded.skipped > 0 {
    warn!(session_id = %id, skipped = graded.skipped, "ungradable answers dropped");
  }

  // A concurrent submit may have finished the session since it was loaded.
  state
    .store
    .submit_attempts(id, Utc::now(), graded.attempts)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(already_submitted)?;

  let analysis = analyze_and_store(&*state.store, &session).await?;
  info!(
    session_id = %id,
    kind = session.kind.as_ref(),
    accuracy = analysis.overall_summary.accuracy,
    "session submitted"
  );

  Ok(Json(SubmitResponse { analysis, results: graded.outcomes, skipped: graded.skipped }))
}

/// `POST /sessions/{id}/analyze`
pub async fn analyze<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionAnalysis>, ApiError>
where
  S: ExamStore + 'static,
{
  let session = visible_session(&*state.store, id, caller).await?;
  if !session.is_finished() {
    return Err(ApiError::Validation {
      field:   "sessionId",
      message: "session has not been submitted".into(),
    });
  }
  let analysis = analyze_and_store(&*state.store, &session).await?;
  if session.kind == SessionKind::Diagnostic {
    info!(session_id = %id, "diagnostic re-analysed");
  }
  Ok(Json(analysis))
}
