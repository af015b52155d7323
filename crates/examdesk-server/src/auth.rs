//! Token producers and the middleware that turns a token into an
//! [`Identity`].

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  Json,
  extract::{Request, State},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  middleware::Next,
  response::{IntoResponse, Response},
};
use chrono::{Duration, Utc};
use examdesk_api::{ApiError, caller::Caller};
use examdesk_core::{
  identity::{Identity, Verification},
  store::ExamStore,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, token::Issued};

/// Cookie carrying the admin session token.
pub const SESSION_COOKIE: &str = "examdesk_session";

/// Pull a token from `Authorization: Bearer` or the session cookie. The
/// header wins when both are present.
pub fn read_token(headers: &HeaderMap) -> Option<&str> {
  let bearer = headers
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "))
    .map(str::trim)
    .filter(|t| !t.is_empty());
  if bearer.is_some() {
    return bearer;
  }

  headers
    .get_all(header::COOKIE)
    .iter()
    .filter_map(|v| v.to_str().ok())
    .flat_map(|v| v.split(';'))
    .filter_map(|pair| pair.trim().split_once('='))
    .find(|(name, _)| *name == SESSION_COOKIE)
    .map(|(_, value)| value)
    .filter(|t| !t.is_empty())
}

fn verify_headers<S>(state: &AppState<S>, headers: &HeaderMap) -> Verification {
  match read_token(headers) {
    Some(token) => state.signer.verify(token, Utc::now()),
    None => Verification::rejected(),
  }
}

/// Verify the request's token, if any, and attach the [`Identity`] for
/// downstream extractors. Never rejects by itself; handlers that need an
/// identity answer 401 through [`Caller`].
pub async fn authenticate<S>(
  State(state): State<AppState<S>>,
  mut req: Request,
  next: Next,
) -> Response
where
  S: ExamStore + 'static,
{
  let verification = verify_headers(&state, req.headers());
  match verification.identity() {
    Some(identity) => {
      req.extensions_mut().insert(identity);
    }
    None if verification.expired => tracing::debug!("expired token presented"),
    None => {}
  }
  next.run(req).await
}

fn sign<S>(state: &AppState<S>, identity: Identity, ttl: Duration) -> Result<Issued, ApiError> {
  let issued = state.signer.sign(identity, ttl, Utc::now()).map_err(ApiError::store)?;
  tracing::info!(?identity, expires_at = %issued.expires_at, "token issued");
  Ok(issued)
}

// ─── Admin login ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub password: String,
}

/// `POST /auth/admin`: check the admin password and hand back a session
/// token, both in the body and as a cookie.
pub async fn admin_login<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<LoginBody>,
) -> Result<Response, ApiError>
where
  S: ExamStore + 'static,
{
  let parsed = PasswordHash::new(&state.config.admin_password_hash).map_err(|e| {
    tracing::error!(error = %e, "admin_password_hash is not a valid PHC string");
    ApiError::Unauthorized
  })?;
  Argon2::default()
    .verify_password(body.password.as_bytes(), &parsed)
    .map_err(|_| ApiError::Unauthorized)?;

  let issued = sign(&state, Identity::Admin, state.config.session_ttl())?;
  let cookie = format!("{SESSION_COOKIE}={}; HttpOnly; Path=/; SameSite=Lax", issued.token);
  let cookie = HeaderValue::from_str(&cookie).map_err(ApiError::store)?;

  Ok(([(header::SET_COOKIE, cookie)], Json(issued)).into_response())
}

// ─── Session tokens ──────────────────────────────────────────────────────────

/// `POST /auth/tokens`: admins mint teacher or student session tokens. The
/// body is the identity itself, e.g. `{"role": "student", "id": "..."}`.
pub async fn issue_token<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Json(identity): Json<Identity>,
) -> Result<(StatusCode, Json<Issued>), ApiError>
where
  S: ExamStore + 'static,
{
  if !caller.0.is_admin() {
    return Err(ApiError::Unauthorized);
  }

  match identity {
    Identity::Teacher(_) => {}
    Identity::Student(id) => {
      state
        .api
        .store
        .get_student(id)
        .await
        .map_err(ApiError::store)?
        .ok_or_else(|| ApiError::NotFound(format!("student {id}")))?;
    }
    Identity::Admin | Identity::ReportViewer(_) => {
      return Err(ApiError::Validation {
        field:   "role",
        message: "only teacher and student tokens can be issued here".into(),
      });
    }
  }

  let issued = sign(&state, identity, state.config.session_ttl())?;
  Ok((StatusCode::CREATED, Json(issued)))
}

// ─── Report tokens ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTokenBody {
  pub student_id: Uuid,
}

/// `POST /auth/report-tokens`: a read-only token for one student's report.
/// Teachers may only mint tokens for students in their own classes.
pub async fn issue_report_token<S>(
  State(state): State<AppState<S>>,
  caller: Caller,
  Json(body): Json<ReportTokenBody>,
) -> Result<(StatusCode, Json<Issued>), ApiError>
where
  S: ExamStore + 'static,
{
  if !matches!(caller.0, Identity::Admin | Identity::Teacher(_)) {
    return Err(ApiError::Unauthorized);
  }

  let id = body.student_id;
  let not_found = || ApiError::NotFound(format!("student {id}"));
  let store = &state.api.store;
  store.get_student(id).await.map_err(ApiError::store)?.ok_or_else(not_found)?;
  let classes = store.list_student_classes(id).await.map_err(ApiError::store)?;
  if !caller.0.can_view_student(id, &classes) {
    return Err(not_found());
  }

  let issued = sign(&state, Identity::ReportViewer(id), state.config.report_token_ttl())?;
  Ok((StatusCode::CREATED, Json(issued)))
}

// ─── Verification ────────────────────────────────────────────────────────────

/// `GET /auth/verify`: `{authenticated, identity?}` for the presented token.
/// Expiry is not disclosed.
pub async fn verify<S>(State(state): State<AppState<S>>, headers: HeaderMap) -> Json<Verification>
where
  S: ExamStore + 'static,
{
  Json(verify_headers(&state, &headers))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
      map.append(name.clone(), HeaderValue::from_str(value).unwrap());
    }
    map
  }

  #[test]
  fn reads_bearer_header() {
    let h = headers(&[(header::AUTHORIZATION, "Bearer abc.def")]);
    assert_eq!(read_token(&h), Some("abc.def"));
  }

  #[test]
  fn reads_session_cookie_among_others() {
    let h = headers(&[(header::COOKIE, "theme=dark; examdesk_session=abc.def; lang=en")]);
    assert_eq!(read_token(&h), Some("abc.def"));
  }

  #[test]
  fn header_wins_over_cookie() {
    let h = headers(&[
      (header::COOKIE, "examdesk_session=from-cookie"),
      (header::AUTHORIZATION, "Bearer from-header"),
    ]);
    assert_eq!(read_token(&h), Some("from-header"));
  }

  #[test]
  fn ignores_other_schemes_and_empty_values() {
    assert_eq!(read_token(&headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwdw==")])), None);
    assert_eq!(read_token(&headers(&[(header::AUTHORIZATION, "Bearer ")])), None);
    assert_eq!(read_token(&headers(&[(header::COOKIE, "examdesk_session=")])), None);
    assert_eq!(read_token(&HeaderMap::new()), None);
  }
}
