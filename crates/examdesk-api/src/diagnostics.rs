//! Handlers for `/diagnostics` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/diagnostics/sample` | Draw a sample without creating a session |
//! | `POST` | `/diagnostics` | Draw a sample and snapshot it into a new session; 201 |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use examdesk_core::{
  assemble::{Sample, assemble_test},
  session::{NewSession, Scope, ScopeRef, ScopeType, Session, SessionKind},
  store::ExamStore,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::{ApiState, caller::Caller, error::ApiError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleBody {
  pub subject:    String,
  pub scope_type: ScopeType,
  #[serde(default)]
  pub scope_ref:  ScopeRef,
  pub count:      usize,
  /// Admin only: the student the new session belongs to.
  #[serde(default)]
  pub student_id: Option<Uuid>,
}

impl SampleBody {
  fn scope(&self) -> Scope {
    Scope {
      subject:    self.subject.clone(),
      scope_type: self.scope_type,
      scope_ref:  self.scope_ref.clone(),
    }
  }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDiagnostic {
  pub session: Session,
  pub missing: bool,
}

/// `POST /diagnostics/sample`
pub async fn sample<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Json(body): Json<SampleBody>,
) -> Result<Json<Sample>, ApiError>
where
  S: ExamStore + 'static,
{
  caller.require_participant()?;
  let sample = assemble_test(&*state.store, &body.scope(), body.count, &state.allowlist).await?;
  Ok(Json(sample))
}

/// `POST /diagnostics`
#[tracing::instrument(skip_all, fields(subject = %body.subject))]
pub async fn create<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Json(body): Json<SampleBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ExamStore + 'static,
{
  let student_id = caller.session_owner(body.student_id)?;
  let mut scope = body.scope();
  let sample = assemble_test(&*state.store, &scope, body.count, &state.allowlist).await?;
  scope.scope_ref = sample.scope_ref;

  let session = state
    .store
    .create_session(NewSession {
      kind: SessionKind::Diagnostic,
      student_id,
      scope,
      question_ids: sample.question_ids,
      started_at: None,
    })
    .await
    .map_err(ApiError::store)?;

  info!(
    session_id = %session.session_id,
    questions = session.question_ids.len(),
    missing = sample.missing,
    "diagnostic session created"
  );
  Ok((StatusCode::CREATED, Json(CreatedDiagnostic { session, missing: sample.missing })))
}
