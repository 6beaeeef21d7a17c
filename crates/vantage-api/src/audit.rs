//! Handlers for the audit trail.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities/:id/audit` | Oldest first; optional `?since=<rfc3339>` |
//! | `GET`  | `/audit/verify` | Walks the whole hash chain |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;
use vantage_core::{audit::AuditVerification, change::ChangeRecord, store::FieldStore};
use vantage_engine::Engine;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct TrailParams {
  pub since: Option<DateTime<Utc>>,
}

/// `GET /entities/:id/audit[?since=...]`
pub async fn trail<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<TrailParams>,
) -> Result<Json<Vec<ChangeRecord>>, ApiError> {
  Ok(Json(engine.audit_trail(id, params.since).await?))
}

/// `GET /audit/verify`
pub async fn verify<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
) -> Result<Json<AuditVerification>, ApiError> {
  Ok(Json(engine.verify_audit_chain().await?))
}
