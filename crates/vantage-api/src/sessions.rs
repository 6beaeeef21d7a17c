//! Handlers for `/sessions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/sessions` | Body: `{"target":{"scope":"all"}}` (target optional); 202, or 409 while another session runs |
//! | `GET`  | `/sessions` | Newest first; optional `?limit` (default 20) |
//! | `GET`  | `/sessions/:id` | Persisted session record |
//! | `GET`  | `/sessions/:id/progress` | Live snapshot while running |
//! | `GET`  | `/sessions/:id/changes` | Every change the session committed |
//! | `POST` | `/sessions/:id/abort` | 409 if the session is no longer running |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vantage_core::{
  change::ChangeRecord,
  session::{RefreshSession, RefreshTarget, RefreshTrigger, SessionProgress},
  store::FieldStore,
};
use vantage_engine::Engine;

use crate::error::ApiError;

const DEFAULT_LIST_LIMIT: usize = 20;

// ─── Start ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct StartBody {
  /// Defaults to every enabled entity.
  pub target: Option<RefreshTarget>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Started {
  pub session_id: Uuid,
}

/// `POST /sessions`
pub async fn start<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<StartBody>,
) -> Result<impl IntoResponse, ApiError> {
  let target = body.target.unwrap_or(RefreshTarget::All);
  let session_id = engine.start_refresh(target, RefreshTrigger::Manual).await?;
  Ok((StatusCode::ACCEPTED, Json(Started { session_id })))
}

// ─── Read ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

/// `GET /sessions[?limit=<n>]`
pub async fn list<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<RefreshSession>>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_LIST_LIMIT);
  Ok(Json(engine.list_sessions(limit).await?))
}

/// `GET /sessions/:id`
pub async fn get_one<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<RefreshSession>, ApiError> {
  Ok(Json(engine.get_session(id).await?))
}

/// `GET /sessions/:id/progress`
pub async fn progress<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SessionProgress>, ApiError> {
  Ok(Json(engine.session_progress(id).await?))
}

/// `GET /sessions/:id/changes`
pub async fn changes<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Vec<ChangeRecord>>, ApiError> {
  Ok(Json(engine.session_changes(id).await?))
}

// ─── Abort ────────────────────────────────────────────────────────────────────

/// `POST /sessions/:id/abort` — 202; in-flight entities still finish.
pub async fn abort<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
  engine.abort_refresh(id).await?;
  Ok(StatusCode::ACCEPTED)
}
