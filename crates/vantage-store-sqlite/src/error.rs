//! Error type for `vantage-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vantage_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum discriminant or number is not recognised.
  #[error("decode error: {0}")]
  Decode(String),

  #[error("entity not found: {0}")]
  EntityNotFound(uuid::Uuid),

  #[error("an entity with slug {0:?} already exists")]
  DuplicateSlug(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
