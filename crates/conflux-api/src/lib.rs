//! JSON HTTP API for Conflux.
//!
//! Exposes an axum [`Router`] backed by any
//! [`conflux_core::store::IdentityStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.

pub mod error;
pub mod identify;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  http::StatusCode,
  routing::{get, post},
};
use conflux_core::store::IdentityStore;
use serde::Deserialize;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` with
/// `CONFLUX_*` environment overrides.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: IdentityStore + Clone + Send + Sync + 'static,
{
  Router::new()
    .route("/identify", post(identify::handler::<S>))
    .route("/healthz", get(|| async { StatusCode::OK }))
    .with_state(store)
}
