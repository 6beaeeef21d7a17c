//! Error type for `vantage-engine`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// A refresh was requested while another session is still running.
  #[error("refresh session {0} is already running")]
  ConcurrentSessionRejected(Uuid),

  #[error("refresh session not found: {0}")]
  SessionNotFound(Uuid),

  /// The session exists but is no longer running.
  #[error("refresh session {0} is not running")]
  SessionNotRunning(Uuid),

  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("an entity with slug {0:?} already exists")]
  DuplicateSlug(String),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error(transparent)]
  Core(#[from] vantage_core::Error),

  /// The field store failed. Fatal for any running session.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("configuration error: {0}")]
  Config(String),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("http client error: {0}")]
  Http(#[from] reqwest::Error),

  /// The session manager task has exited.
  #[error("session manager is not running")]
  ManagerStopped,
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
