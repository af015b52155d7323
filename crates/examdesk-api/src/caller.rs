//! The verified caller of a request.

use axum::{extract::FromRequestParts, http::request::Parts};
use examdesk_core::identity::Identity;
use uuid::Uuid;

use crate::error::ApiError;

/// Extracts the [`Identity`] placed in request extensions by the server's
/// auth layer. Requests without one are rejected with 401.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Identity);

impl Caller {
  /// Identities that may start and answer sessions. Report tokens are
  /// read-only.
  pub fn require_participant(&self) -> Result<Identity, ApiError> {
    match self.0 {
      Identity::ReportViewer(_) => Err(ApiError::Unauthorized),
      other => Ok(other),
    }
  }

  /// The student a new session belongs to. Students own their own sessions;
  /// admins may name a student; teachers start anonymous ones.
  pub fn session_owner(&self, requested: Option<Uuid>) -> Result<Option<Uuid>, ApiError> {
    Ok(match self.require_participant()? {
      Identity::Student(id) => Some(id),
      Identity::Admin => requested,
      Identity::Teacher(_) | Identity::ReportViewer(_) => None,
    })
  }
}

impl<S> FromRequestParts<S> for Caller
where
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
    parts
      .extensions
      .get::<Identity>()
      .copied()
      .map(Caller)
      .ok_or(ApiError::Unauthorized)
  }
}
