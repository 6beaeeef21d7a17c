//! Handlers for `/entities` endpoints and the field catalog.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities` | Optional `?include_disabled=true` |
//! | `POST` | `/entities` | Body: `{"slug":"acme","display_name":"Acme"}`; 201, 409 on a taken slug |
//! | `GET`  | `/entities/:id` | Entity, current field values and last verification |
//! | `POST` | `/entities/:id/enabled` | Body: `{"enabled":false}` |
//! | `POST` | `/entities/:id/verify` | Body: `{"user_id":"..."}` |
//! | `POST` | `/entities/:id/fields/:field/correct` | Body: [`CorrectBody`]; 201 + change record |
//! | `POST` | `/entities/:id/fields/:field/force` | Body: [`ForceBody`]; 201 + change record |
//! | `GET`  | `/catalog` | Tracked fields |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vantage_core::{
  entity::{Entity, EntityView},
  field::{Confidence, FieldCatalog, FieldData, SourceTier},
  store::FieldStore,
};
use vantage_engine::Engine;

use crate::error::ApiError;

// ─── Registry ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  #[serde(default)]
  pub include_disabled: bool,
}

/// `GET /entities[?include_disabled=true]`
pub async fn list<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Entity>>, ApiError> {
  Ok(Json(engine.list_entities(params.include_disabled).await?))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub slug:         String,
  pub display_name: String,
}

/// `POST /entities`
pub async fn create<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let entity = engine.add_entity(&body.slug, &body.display_name).await?;
  Ok((StatusCode::CREATED, Json(entity)))
}

/// `GET /entities/:id`
pub async fn get_one<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EntityView>, ApiError> {
  Ok(Json(engine.get_entity(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct EnabledBody {
  pub enabled: bool,
}

/// `POST /entities/:id/enabled`
pub async fn set_enabled<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<EnabledBody>,
) -> Result<Json<Entity>, ApiError> {
  Ok(Json(engine.set_entity_enabled(id, body.enabled).await?))
}

// ─── Verification ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
  pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Verified {
  pub verified_at: DateTime<Utc>,
}

/// `POST /entities/:id/verify`
pub async fn verify<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<VerifyBody>,
) -> Result<Json<Verified>, ApiError> {
  let verified_at = engine.verify_entity(id, &body.user_id).await?;
  Ok(Json(Verified { verified_at }))
}

// ─── Corrections ──────────────────────────────────────────────────────────────

/// Body for `POST /entities/:id/fields/:field/correct`.
#[derive(Debug, Deserialize)]
pub struct CorrectBody {
  pub value:   FieldData,
  pub user_id: String,
  pub reason:  String,
}

/// `POST /entities/:id/fields/:field/correct` — the stored value becomes
/// protected from automated refresh.
pub async fn correct<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path((id, field)): Path<(Uuid, String)>,
  Json(body): Json<CorrectBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = engine
    .manual_correct(id, &field, body.value, &body.user_id, &body.reason)
    .await?;
  Ok((StatusCode::CREATED, Json(record)))
}

/// Body for `POST /entities/:id/fields/:field/force`.
#[derive(Debug, Deserialize)]
pub struct ForceBody {
  pub value:       FieldData,
  pub source_tier: SourceTier,
  /// Defaults to the tier's configured confidence.
  pub confidence:  Option<Confidence>,
  pub user_id:     String,
  pub reason:      String,
}

/// `POST /entities/:id/fields/:field/force` — overwrites even a manually
/// corrected value and clears its protection.
pub async fn force<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Path((id, field)): Path<(Uuid, String)>,
  Json(body): Json<ForceBody>,
) -> Result<impl IntoResponse, ApiError> {
  let record = engine
    .force_update(
      id,
      &field,
      body.value,
      body.source_tier,
      body.confidence,
      &body.user_id,
      &body.reason,
    )
    .await?;
  Ok((StatusCode::CREATED, Json(record)))
}

// ─── Catalog ──────────────────────────────────────────────────────────────────

/// `GET /catalog`
pub async fn catalog<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
) -> Json<FieldCatalog> {
  Json(engine.catalog().clone())
}
