//! The automated write path into the field store.
//!
//! [`ChangeDetector`] turns resolved values into [`FieldUpdate`] proposals and
//! commits one entity's worth in a single store batch. Equality, override
//! protection, and classification are evaluated by the store against the
//! committed value inside that batch, so the verdicts cannot go stale.

use std::sync::Arc;

use uuid::Uuid;
use vantage_core::{
  change::ChangeRecord,
  field::{Confidence, FieldData, FieldSpec, SourceTier},
  store::{FieldStore, FieldUpdate, RejectReason, UpdateOutcome},
};

use crate::{Error, Result};

/// A value the resolver found for one field.
#[derive(Debug, Clone)]
pub struct Resolved {
  pub spec:       FieldSpec,
  pub value:      FieldData,
  pub tier:       SourceTier,
  pub confidence: Confidence,
}

/// What committing one entity did.
#[derive(Debug, Clone, Default)]
pub struct EntityCommit {
  pub changes:   Vec<ChangeRecord>,
  pub unchanged: usize,
  /// Proposals refused because the field holds a manual correction.
  pub blocked:   usize,
  /// Proposals refused for any other reason, by field.
  pub rejected:  Vec<(String, RejectReason)>,
}

pub struct ChangeDetector<S> {
  store: Arc<S>,
}

impl<S> Clone for ChangeDetector<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: FieldStore> ChangeDetector<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Commit every resolved field of one entity atomically.
  pub async fn commit_entity(
    &self,
    entity_id: Uuid,
    session_id: Option<Uuid>,
    resolved: Vec<Resolved>,
  ) -> Result<EntityCommit> {
    let fields: Vec<String> = resolved.iter().map(|r| r.spec.name.clone()).collect();
    let updates = resolved
      .into_iter()
      .map(|r| FieldUpdate {
        entity_id,
        spec: r.spec,
        value: r.value,
        source_tier: r.tier,
        confidence: r.confidence,
        session_id,
      })
      .collect();

    let outcomes = self.store.propose_updates(updates).await.map_err(Error::store)?;

    let mut commit = EntityCommit::default();
    for (field, outcome) in fields.into_iter().zip(outcomes) {
      match outcome {
        UpdateOutcome::Applied(record) => {
          tracing::info!(
            entity_id = %entity_id,
            field = %record.field,
            change_type = %record.change_type,
            severity = %record.severity,
            tier = %record.source_tier,
            "change committed"
          );
          commit.changes.push(record);
        }
        UpdateOutcome::Unchanged => commit.unchanged += 1,
        UpdateOutcome::Rejected(RejectReason::OverrideBlocked { .. }) => {
          tracing::info!(entity_id = %entity_id, field = %field, "blocked by manual correction");
          commit.blocked += 1;
        }
        UpdateOutcome::Rejected(reason) => {
          tracing::warn!(entity_id = %entity_id, field = %field, ?reason, "proposal rejected");
          commit.rejected.push((field, reason));
        }
      }
    }
    Ok(commit)
  }
}

#[cfg(test)]
mod tests {
  use vantage_core::{
    change::ChangeType,
    field::{FieldCatalog, Severity},
    store::ManualCorrection,
  };
  use vantage_store_sqlite::SqliteStore;

  use super::*;

  fn resolved(field: &str, value: FieldData, tier: SourceTier) -> Resolved {
    Resolved {
      spec: FieldCatalog::default().require(field).unwrap().clone(),
      value,
      tier,
      confidence: Confidence::new(70),
    }
  }

  fn category(s: &str) -> FieldData { FieldData::Category(s.into()) }

  #[tokio::test]
  async fn secondary_pricing_change_is_high_severity_update() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let e = store.add_entity("acme".into(), "Acme".into()).await.unwrap();
    let detector = ChangeDetector::new(store.clone());

    detector
      .commit_entity(
        e.entity_id,
        None,
        vec![resolved("pricing_model", category("subscription"), SourceTier::Live)],
      )
      .await
      .unwrap();

    let commit = detector
      .commit_entity(
        e.entity_id,
        None,
        vec![resolved("pricing_model", category("usage-based"), SourceTier::Secondary)],
      )
      .await
      .unwrap();

    assert_eq!(commit.changes.len(), 1);
    let record = &commit.changes[0];
    assert_eq!(record.change_type, ChangeType::Updated);
    assert_eq!(record.severity, Severity::High);

    let stored = store.get_field(e.entity_id, "pricing_model").await.unwrap().unwrap();
    assert_eq!(stored.value, category("usage-based"));
    assert_eq!(stored.source_tier, SourceTier::Secondary);
    assert!(!stored.manually_corrected);
  }

  #[tokio::test]
  async fn corrected_pricing_is_blocked_and_counted() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let e = store.add_entity("acme".into(), "Acme".into()).await.unwrap();
    store
      .manual_correct(ManualCorrection {
        entity_id: e.entity_id,
        spec:      FieldCatalog::default().require("pricing_model").unwrap().clone(),
        value:     category("subscription"),
        user_id:   "analyst-1".into(),
        reason:    "confirmed with sales".into(),
      })
      .await
      .unwrap();
    let detector = ChangeDetector::new(store.clone());

    let commit = detector
      .commit_entity(
        e.entity_id,
        None,
        vec![
          resolved("pricing_model", category("usage-based"), SourceTier::Secondary),
          resolved("ceo", FieldData::Text("Ada".into()), SourceTier::Secondary),
        ],
      )
      .await
      .unwrap();

    assert_eq!(commit.blocked, 1);
    assert_eq!(commit.changes.len(), 1);
    assert_eq!(commit.changes[0].field, "ceo");

    let stored = store.get_field(e.entity_id, "pricing_model").await.unwrap().unwrap();
    assert_eq!(stored.value, category("subscription"));
    assert!(stored.manually_corrected);
  }
}
