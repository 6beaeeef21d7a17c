//! Handlers for `/quality` endpoints.
//!
//! `entity_ids` is accepted as a comma-separated string.

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use uuid::Uuid;
use vantage_core::{
  quality::{QualityScore, StaleField},
  store::FieldStore,
};
use vantage_engine::Engine;

use crate::error::ApiError;

#[derive(Debug, Deserialize, Default)]
pub struct ScoresParams {
  /// Comma-separated entity ids. Omitted means every enabled entity.
  pub entity_ids: Option<String>,
}

fn parse_ids(raw: &str) -> Result<Vec<Uuid>, ApiError> {
  raw
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| {
      s.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid entity id {s:?}")))
    })
    .collect()
}

/// `GET /quality[?entity_ids=<id>,<id>]`
pub async fn scores<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(params): Query<ScoresParams>,
) -> Result<Json<Vec<QualityScore>>, ApiError> {
  let ids = params.entity_ids.as_deref().map(parse_ids).transpose()?;
  Ok(Json(engine.quality_scores(ids.as_deref()).await?))
}

#[derive(Debug, Deserialize, Default)]
pub struct StaleParams {
  /// Overrides the configured stale threshold (0–100).
  pub threshold: Option<f64>,
}

/// `GET /quality/stale[?threshold=<score>]` — most stale first.
pub async fn stale<S: FieldStore + 'static>(
  State(engine): State<Engine<S>>,
  Query(params): Query<StaleParams>,
) -> Result<Json<Vec<StaleField>>, ApiError> {
  if let Some(t) = params.threshold
    && !(0.0..=100.0).contains(&t)
  {
    return Err(ApiError::BadRequest(format!("threshold {t} is outside 0..=100")));
  }
  Ok(Json(engine.stale_fields(params.threshold).await?))
}
