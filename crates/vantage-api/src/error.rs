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
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The request clashes with current state, e.g. a refresh is already
  /// running.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("service unavailable: {0}")]
  Unavailable(String),

  #[error("internal error: {0}")]
  Internal(#[source] vantage_engine::Error),
}

impl From<vantage_engine::Error> for ApiError {
  fn from(e: vantage_engine::Error) -> Self {
    use vantage_core::Error as Core;
    use vantage_engine::Error as E;

    match e {
      E::SessionNotFound(_) | E::EntityNotFound(_) | E::Core(Core::EntityNotFound(_)) => {
        Self::NotFound(e.to_string())
      }
      E::ConcurrentSessionRejected(_)
      | E::SessionNotRunning(_)
      | E::DuplicateSlug(_)
      | E::Core(Core::DuplicateSlug(_)) => Self::Conflict(e.to_string()),
      E::InvalidInput(_)
      | E::Core(Core::UnknownField(_) | Core::KindMismatch { .. } | Core::InvalidCatalog(_)) => {
        Self::BadRequest(e.to_string())
      }
      E::ManagerStopped => Self::Unavailable(e.to_string()),
      other => Self::Internal(other),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Internal(e) => {
        tracing::error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
