//! JSON REST API for the examdesk diagnostic pipeline.
//!
//! Exposes an axum [`Router`] backed by any [`ExamStore`]. Token handling,
//! TLS, and transport concerns are the caller's responsibility: the router
//! expects a verified [`examdesk_core::identity::Identity`] in each request's
//! extensions and answers 401 without one.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", examdesk_api::api_router(state.clone()))
//! ```

pub mod caller;
pub mod cohort;
pub mod diagnostics;
pub mod error;
pub mod fanout;
pub mod practice;
pub mod sessions;
pub mod windows;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use examdesk_core::{scope::ExamAllowlist, store::ExamStore};

pub use error::ApiError;

/// Default number of per-student fetches run at once.
pub const DEFAULT_FANOUT: usize = 4;

/// Everything the handlers share.
pub struct ApiState<S> {
  pub store:              Arc<S>,
  pub allowlist:          ExamAllowlist,
  pub fanout_concurrency: usize,
}

impl<S> ApiState<S> {
  pub fn new(store: Arc<S>, allowlist: ExamAllowlist) -> Self {
    Self { store, allowlist, fanout_concurrency: DEFAULT_FANOUT }
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: Arc<ApiState<S>>) -> Router<()>
where
  S: ExamStore + 'static,
{
  Router::new()
    // Diagnostics
    .route("/diagnostics", post(diagnostics::create::<S>))
    .route("/diagnostics/sample", post(diagnostics::sample::<S>))
    // Sessions
    .route("/sessions/{id}", get(sessions::get_one::<S>))
    .route("/sessions/{id}/questions", get(sessions::questions::<S>))
    .route("/sessions/{id}/submit", post(sessions::submit::<S>))
    .route("/sessions/{id}/analyze", post(sessions::analyze::<S>))
    .route("/sessions/{id}/result", get(sessions::result::<S>))
    // Practice
    .route("/practice", post(practice::start::<S>))
    .route("/practice/questions", get(practice::questions::<S>))
    .route("/grade", post(practice::grade::<S>))
    // Analytics
    .route("/classes/{id}/cohort", get(cohort::cohort::<S>))
    .route("/classes/{id}/remediation", post(cohort::remediation::<S>))
    .route("/students/{id}/report", get(cohort::student_report::<S>))
    .with_state(state)
}

#[cfg(test)]
mod tests;
