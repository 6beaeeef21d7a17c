//! Error types for `vantage-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::field::FieldKind;

#[derive(Debug, Error)]
pub enum Error {
  #[error("entity not found: {0}")]
  EntityNotFound(Uuid),

  #[error("an entity with slug {0:?} already exists")]
  DuplicateSlug(String),

  #[error("field {0:?} is not in the catalog")]
  UnknownField(String),

  #[error("field {field:?} expects a {expected} value, got {found}")]
  KindMismatch {
    field:    String,
    expected: FieldKind,
    found:    FieldKind,
  },

  #[error("invalid field catalog: {0}")]
  InvalidCatalog(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
