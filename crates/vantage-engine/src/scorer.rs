//! Read-only quality reports over the field store.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use vantage_core::{
  entity::EntityView,
  field::FieldCatalog,
  quality::{self, QualityConfig, QualityScore, StaleField},
  store::FieldStore,
};

use crate::{Error, Result};

pub struct QualityService<S> {
  store:   Arc<S>,
  catalog: Arc<FieldCatalog>,
  config:  QualityConfig,
}

impl<S> Clone for QualityService<S> {
  fn clone(&self) -> Self {
    Self {
      store:   Arc::clone(&self.store),
      catalog: Arc::clone(&self.catalog),
      config:  self.config.clone(),
    }
  }
}

impl<S: FieldStore> QualityService<S> {
  pub fn new(store: Arc<S>, catalog: Arc<FieldCatalog>, config: QualityConfig) -> Self {
    Self { store, catalog, config }
  }

  pub fn config(&self) -> &QualityConfig { &self.config }

  async fn view(&self, id: Uuid) -> Result<EntityView> {
    self
      .store
      .materialize(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(id))
  }

  /// Views of the named entities, or of every enabled entity.
  async fn views(&self, entity_ids: Option<&[Uuid]>) -> Result<Vec<EntityView>> {
    let ids: Vec<Uuid> = match entity_ids {
      Some(ids) => ids.to_vec(),
      None => self
        .store
        .list_entities(false)
        .await
        .map_err(Error::store)?
        .into_iter()
        .map(|e| e.entity_id)
        .collect(),
    };
    let mut views = Vec::with_capacity(ids.len());
    for id in ids {
      views.push(self.view(id).await?);
    }
    Ok(views)
  }

  pub async fn score(&self, entity_id: Uuid) -> Result<QualityScore> {
    let view = self.view(entity_id).await?;
    Ok(quality::score(&view, &self.catalog, &self.config, Utc::now()))
  }

  /// Scores for `entity_ids`, or for every enabled entity when `None`.
  pub async fn scores(&self, entity_ids: Option<&[Uuid]>) -> Result<Vec<QualityScore>> {
    let now = Utc::now();
    Ok(
      self
        .views(entity_ids)
        .await?
        .iter()
        .map(|view| quality::score(view, &self.catalog, &self.config, now))
        .collect(),
    )
  }

  /// Every stale field across enabled entities, most stale first.
  pub async fn stale_fields(&self, threshold: Option<f64>) -> Result<Vec<StaleField>> {
    let threshold = threshold.unwrap_or(self.config.stale_threshold);
    let now = Utc::now();
    let mut stale: Vec<StaleField> = self
      .views(None)
      .await?
      .iter()
      .flat_map(|view| quality::stale_fields(view, &self.catalog, threshold, now))
      .collect();
    quality::sort_most_stale_first(&mut stale);
    Ok(stale)
  }
}

#[cfg(test)]
mod tests {
  use vantage_core::{
    field::{Confidence, FieldData, SourceTier},
    quality::CEILING,
    store::FieldUpdate,
  };
  use vantage_store_sqlite::SqliteStore;

  use super::*;

  #[tokio::test]
  async fn fresh_write_scores_full_freshness() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let catalog = Arc::new(FieldCatalog::default());
    let e = store.add_entity("acme".into(), "Acme".into()).await.unwrap();
    store
      .propose_update(FieldUpdate {
        entity_id:   e.entity_id,
        spec:        catalog.require("ceo").unwrap().clone(),
        value:       FieldData::Text("Ada".into()),
        source_tier: SourceTier::Live,
        confidence:  Confidence::new(90),
        session_id:  None,
      })
      .await
      .unwrap();

    let service = QualityService::new(store, catalog.clone(), QualityConfig::default());
    let score = service.score(e.entity_id).await.unwrap();
    assert!((score.freshness - CEILING).abs() < 0.01, "{score:?}");
    assert!(score.completeness > 0.0 && score.completeness < CEILING);
    assert!(!score.healthy);

    // Freshly written fields are never stale at the default threshold.
    assert!(service.stale_fields(None).await.unwrap().is_empty());
    // Every populated field is stale against a threshold above the ceiling.
    assert_eq!(service.stale_fields(Some(CEILING + 1.0)).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn unknown_entity_is_an_error() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let service =
      QualityService::new(store, Arc::new(FieldCatalog::default()), QualityConfig::default());
    let err = service.scores(Some(&[Uuid::new_v4()][..])).await.unwrap_err();
    assert!(matches!(err, Error::EntityNotFound(_)));
  }

  #[tokio::test]
  async fn disabled_entities_are_left_out_of_reports() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let a = store.add_entity("acme".into(), "Acme".into()).await.unwrap();
    store.add_entity("globex".into(), "Globex".into()).await.unwrap();
    store.set_entity_enabled(a.entity_id, false).await.unwrap();

    let service =
      QualityService::new(store, Arc::new(FieldCatalog::default()), QualityConfig::default());
    assert_eq!(service.scores(None).await.unwrap().len(), 1);
    // Named explicitly, a disabled entity is still scored.
    assert_eq!(service.scores(Some(&[a.entity_id][..])).await.unwrap().len(), 1);
  }
}
