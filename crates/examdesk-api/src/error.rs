//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tokio::task::JoinError;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("invalid {field}: {message}")]
  Validation {
    field:   &'static str,
    message: String,
  },

  /// Every identity failure looks the same from outside.
  #[error("unauthorized")]
  Unauthorized,

  #[error("not found: {0}")]
  NotFound(String),

  /// The store (or a task talking to it) failed. Never retried.
  #[error("dependency failure: {0}")]
  Dependency(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  pub fn store<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Dependency(Box::new(err))
  }
}

impl From<examdesk_core::Error> for ApiError {
  fn from(err: examdesk_core::Error) -> Self {
    use examdesk_core::Error as Core;
    match err {
      Core::Validation { field, message } => Self::Validation { field, message },
      Core::NotFound(what) => Self::NotFound(what),
      Core::Store(inner) => Self::Dependency(inner),
      other @ (Core::Serialization(_) | Core::Export(_)) => Self::Dependency(Box::new(other)),
    }
  }
}

impl From<JoinError> for ApiError {
  fn from(err: JoinError) -> Self { Self::Dependency(Box::new(err)) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Validation { field, message } => (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message, "field": field })),
      )
        .into_response(),
      ApiError::Unauthorized => {
        (StatusCode::UNAUTHORIZED, Json(json!({ "error": "unauthorized" }))).into_response()
      }
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, Json(json!({ "error": m }))).into_response(),
      ApiError::Dependency(e) => {
        tracing::error!(error = %e, "dependency failure");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": e.to_string() })))
          .into_response()
      }
    }
  }
}
