//! Handlers for class-level analytics.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/classes/{id}/cohort` | `?window=latest\|30d`; owning teacher or admin |
//! | `POST` | `/classes/{id}/remediation` | Body: `{"window":"30d","typeIds":[...]}` |
//! | `GET`  | `/students/{id}/report` | `?window=latest\|30d` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::Utc;
use examdesk_core::{
  cohort::{self, CohortReport, StudentReport, Window},
  remediation::{self, RemediationExport},
  store::ExamStore,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
  ApiState,
  caller::Caller,
  error::ApiError,
  windows::{catalog_for, load_window, load_windows, visible_class},
};

#[derive(Debug, Default, Deserialize)]
pub struct WindowParams {
  #[serde(default)]
  pub window: Window,
}

// ─── Cohort ──────────────────────────────────────────────────────────────────

/// `GET /classes/{id}/cohort[?window=30d]`
#[tracing::instrument(skip_all, fields(class_id = %id, window = ?params.window))]
pub async fn cohort<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Query(params): Query<WindowParams>,
) -> Result<Json<CohortReport>, ApiError>
where
  S: ExamStore + 'static,
{
  let class = visible_class(&*state.store, id, caller.0).await?;
  let members = state.store.list_class_members(class.class_id).await.map_err(ApiError::store)?;

  let windows = load_windows(&state, members, params.window, Utc::now()).await?;
  let catalog = catalog_for(&*state.store, &windows).await?;
  let report = cohort::aggregate(class.class_id, params.window, &windows, &catalog);

  info!(
    students = report.students.len(),
    types = report.class_summary_by_type.len(),
    "cohort aggregated"
  );
  Ok(Json(report))
}

// ─── Remediation ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationBody {
  #[serde(default)]
  pub window:   Window,
  #[serde(default)]
  pub type_ids: Vec<Uuid>,
}

/// `POST /classes/{id}/remediation`
#[tracing::instrument(skip_all, fields(class_id = %id, window = ?body.window))]
pub async fn remediation<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Json(body): Json<RemediationBody>,
) -> Result<Json<RemediationExport>, ApiError>
where
  S: ExamStore + 'static,
{
  let selected = remediation::validate_types(&body.type_ids)?;
  let class = visible_class(&*state.store, id, caller.0).await?;
  let members = state.store.list_class_members(class.class_id).await.map_err(ApiError::store)?;

  let windows = load_windows(&state, members, body.window, Utc::now()).await?;
  let catalog = catalog_for(&*state.store, &windows).await?;
  let export = remediation::build_export(class.class_id, body.window, &windows, &selected, &catalog)?;

  info!(flagged = export.remedial_students.len(), "remediation roster built");
  Ok(Json(export))
}

// ─── Student report ──────────────────────────────────────────────────────────

/// `GET /students/{id}/report[?window=30d]`
pub async fn student_report<S>(
  State(state): State<Arc<ApiState<S>>>,
  caller: Caller,
  Path(id): Path<Uuid>,
  Query(params): Query<WindowParams>,
) -> Result<Json<StudentReport>, ApiError>
where
  S: ExamStore + 'static,
{
  let not_found = || ApiError::NotFound(format!("student {id} not found"));
  let student = state.store.get_student(id).await.map_err(ApiError::store)?.ok_or_else(not_found)?;
  let classes = state.store.list_student_classes(id).await.map_err(ApiError::store)?;
  if !caller.0.can_view_student(id, &classes) {
    return Err(not_found());
  }

  let window = load_window(&*state.store, student, params.window, Utc::now()).await?;
  let catalog = catalog_for(&*state.store, std::slice::from_ref(&window)).await?;
  Ok(Json(cohort::student_report(params.window, &window, &catalog)))
}
