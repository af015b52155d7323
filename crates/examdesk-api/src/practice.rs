//! Handlers for practice sessions and one-off grading.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/practice` | Start a practice session on one chapter (and type); 201 |
//! | `GET`  | `/practice/questions` | `?chapterId&typeId[&difficulty]` |
//! | `POST` | `/grade` | Grade one answer; nothing is stored |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use examdesk_core::{
  evaluate::is_correct,
  question::QuestionView,
  session::{NewSession, Scope, SessionKind, SubmittedAnswer},
  store::ExamStore,
  taxonomy::Difficulty,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::{ApiState, caller::Caller, error::ApiError};

// ─── Start ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody {
  pub subject:    String,
  pub chapter_id: Uuid,
  #[serde(default)]
  pub type_id:    Option<Uuid>,
  #[serde(default)]
  pub student_id: Option<Uuid>,
}

/// `POST /practice`
pub async fn start<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Json(body): Json<StartBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExamStore + 'static,
{
  let student_id = caller.session_owner(body.student_id)?;
  let session = state
    .store
    .create_session(NewSession {
      kind: SessionKind::Practice,
      student_id,
      scope: Scope::chapter(body.subject, body.chapter_id, body.type_id),
      question_ids: Vec::new(),
      started_at: None,
    })
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(session)))
}

// ─── Questions ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionParams {
  pub chapter_id: Uuid,
  pub type_id:    Uuid,
  pub difficulty: Option<Difficulty>,
}

/// `GET /practice/questions?chapterId=<id>&typeId=<id>[&difficulty=easy]`
pub async fn questions<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Query(params): Query<QuestionParams>,
) -> Result<Json<Vec<QuestionView>>, ApiError>
where
  S: ExamStore + 'static,
{
  caller.require_participant()?;
  let questions = state
    .store
    .list_type_questions(params.chapter_id, params.type_id, params.difficulty)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(questions.iter().map(|q| q.view()).collect()))
}

// ─── Grade ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeBody {
  pub question_id: Uuid,
  pub answer:      SubmittedAnswer,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
  pub is_correct: bool,
}

/// `POST /grade`
pub async fn grade<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Json(body): Json<GradeBody>,
) -> Result<Json<GradeResponse>, ApiError>
where
  S: ExamStore + 'static,
{
  caller.require_participant()?;
  let question = state
    .store
    .get_questions(vec![body.question_id])
    .await
    .map_err(ApiError::store)?
    .into_iter()
    .next()
    .ok_or_else(|| ApiError::NotFound(format!("question {} not found", body.question_id)))?;

  let correct = is_correct(&body.answer, &question.key);
  debug!(question_id = %question.question_id, correct, "graded single answer");
  Ok(Json(GradeResponse { is_correct: correct }))
}
