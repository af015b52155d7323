//! HTTP server for examdesk: configuration, identity tokens, and the
//! middleware that feeds verified identities into the API router.

pub mod auth;
pub mod token;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use axum::{
  Router, middleware,
  routing::{get, post},
};
use chrono::Duration;
use examdesk_api::{ApiState, DEFAULT_FANOUT};
use examdesk_core::store::ExamStore;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use token::TokenSigner;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `EXAMDESK_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:                  String,
  pub port:                  u16,
  pub store_path:            PathBuf,
  /// HMAC key for every issued token.
  pub token_secret:          String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub admin_password_hash:   String,
  #[serde(default = "default_session_ttl_hours")]
  pub session_ttl_hours:     i64,
  #[serde(default = "default_report_token_ttl_days")]
  pub report_token_ttl_days: i64,
  #[serde(default = "default_fanout")]
  pub fanout_concurrency:    usize,
  /// Subject → chapter codes making up that subject's exam scope.
  #[serde(default)]
  pub exam_scopes:           HashMap<String, Vec<String>>,
}

fn default_session_ttl_hours() -> i64 { 12 }
fn default_report_token_ttl_days() -> i64 { 14 }
fn default_fanout() -> usize { DEFAULT_FANOUT }

impl ServerConfig {
  pub fn session_ttl(&self) -> Duration { Duration::hours(self.session_ttl_hours) }

  pub fn report_token_ttl(&self) -> Duration { Duration::days(self.report_token_ttl_days) }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state for the auth handlers and middleware.
pub struct AppState<S> {
  pub api:    Arc<ApiState<S>>,
  pub signer: Arc<TokenSigner>,
  pub config: Arc<ServerConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self { api: self.api.clone(), signer: self.signer.clone(), config: self.config.clone() }
  }
}

impl<S> AppState<S> {
  /// Overrides the API's fan-out limit with the configured one.
  pub fn new(mut api: ApiState<S>, config: ServerConfig) -> Self {
    api.fanout_concurrency = config.fanout_concurrency.max(1);
    Self {
      api:    Arc::new(api),
      signer: Arc::new(TokenSigner::new(config.token_secret.clone())),
      config: Arc::new(config),
    }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the full application: `/api/*` from `examdesk-api`, `/auth/*` here,
/// all behind token verification and request tracing.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: ExamStore + 'static,
{
  let auth_routes = Router::new()
    .route("/admin", post(auth::admin_login::<S>))
    .route("/tokens", post(auth::issue_token::<S>))
    .route("/report-tokens", post(auth::issue_report_token::<S>))
    .route("/verify", get(auth::verify::<S>))
    .with_state(state.clone());

  Router::new()
    .nest("/api", examdesk_api::api_router(state.api.clone()))
    .nest("/auth", auth_routes)
    .layer(middleware::from_fn_with_state(state, auth::authenticate::<S>))
    .layer(TraceLayer::new_for_http())
}
