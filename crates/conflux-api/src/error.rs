//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("server error: {0}")]
  Server(String),
}

impl From<conflux_core::Error> for ApiError {
  fn from(e: conflux_core::Error) -> Self {
    match e {
      conflux_core::Error::Validation => ApiError::BadRequest(e.to_string()),
      other => {
        // Integrity and storage failures are the server's fault; log the
        // detail, the caller gets an opaque message and no retry guidance.
        tracing::error!(error = %other, "identify failed");
        ApiError::Server("server error".to_owned())
      }
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Server(m) => (StatusCode::INTERNAL_SERVER_ERROR, m.clone()),
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
