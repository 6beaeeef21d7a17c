//! The `FieldStore` trait and its request/response types.
//!
//! The trait is implemented by storage backends (e.g. `vantage-store-sqlite`).
//! The engine and API depend on this abstraction, not on any backend.
//!
//! Override protection lives here: [`FieldStore::propose_update`] must run
//! [`crate::change::evaluate`] against the current value atomically with the
//! write it leads to, and must never touch a manually corrected field. Only
//! [`FieldStore::force_update`] may do that, and nothing automated calls it.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  audit::AuditEntry,
  change::ChangeRecord,
  entity::{Entity, EntityView},
  field::{Confidence, FieldData, FieldSpec, FieldValue, SourceTier},
  session::RefreshSession,
};

// ─── Requests ────────────────────────────────────────────────────────────────

/// An automated proposal for one field, produced by source resolution.
#[derive(Debug, Clone)]
pub struct FieldUpdate {
  pub entity_id:   Uuid,
  pub spec:        FieldSpec,
  pub value:       FieldData,
  pub source_tier: SourceTier,
  pub confidence:  Confidence,
  pub session_id:  Option<Uuid>,
}

/// A user-entered correction. Always applied; sets `manually_corrected`.
///
/// A correction is audited even when it repeats the current value; the
/// record is then `Updated` with `old_value == new_value`, marking a human
/// re-confirmation of the field.
#[derive(Debug, Clone)]
pub struct ManualCorrection {
  pub entity_id: Uuid,
  pub spec:      FieldSpec,
  pub value:     FieldData,
  pub user_id:   String,
  pub reason:    String,
}

/// The separately-authorised path that may replace a manually corrected
/// value. Clears `manually_corrected`.
#[derive(Debug, Clone)]
pub struct ForcedUpdate {
  pub entity_id:   Uuid,
  pub spec:        FieldSpec,
  pub value:       FieldData,
  pub source_tier: SourceTier,
  pub confidence:  Confidence,
  pub user_id:     String,
  pub reason:      String,
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// Why an automated proposal was refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RejectReason {
  /// The field holds a manual correction.
  OverrideBlocked { correction_reason: Option<String> },
  /// Automated proposals may not claim the `Manual` tier.
  ManualTier,
  /// The value's kind does not match the field.
  KindMismatch,
  EntityNotFound,
}

/// Result of [`FieldStore::propose_update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
  Applied(ChangeRecord),
  /// Equal to the current value; nothing written, `last_updated` untouched.
  Unchanged,
  Rejected(RejectReason),
}

impl UpdateOutcome {
  pub fn is_override_blocked(&self) -> bool {
    matches!(self, Self::Rejected(RejectReason::OverrideBlocked { .. }))
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Vantage field store backend.
///
/// Field values are superseded, never deleted; every supersession appends an
/// audit entry in the same transaction.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait FieldStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Whether `err` is the rejection [`FieldStore::add_entity`] returns for a
  /// slug that is already registered.
  fn is_duplicate_slug(_err: &Self::Error) -> bool { false }

  // ── Entities ──────────────────────────────────────────────────────────

  /// Register a new enabled entity. Fails if `slug` is taken.
  fn add_entity(
    &self,
    slug: String,
    display_name: String,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  fn get_entity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  fn list_entities(
    &self,
    include_disabled: bool,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Soft-enable or soft-disable an entity. Returns `None` if not found.
  fn set_entity_enabled(
    &self,
    id: Uuid,
    enabled: bool,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// Materialise the current state of an entity. `None` if not found.
  fn materialize(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<EntityView>, Self::Error>> + Send + '_;

  fn get_field<'a>(
    &'a self,
    id: Uuid,
    field: &'a str,
  ) -> impl Future<Output = Result<Option<FieldValue>, Self::Error>> + Send + 'a;

  // ── Writes ────────────────────────────────────────────────────────────

  /// The automated write path for one field.
  fn propose_update(
    &self,
    update: FieldUpdate,
  ) -> impl Future<Output = Result<UpdateOutcome, Self::Error>> + Send + '_;

  /// Evaluate and commit several proposals in one transaction, so readers
  /// never observe a partially refreshed entity. Outcomes are returned in
  /// input order.
  fn propose_updates(
    &self,
    updates: Vec<FieldUpdate>,
  ) -> impl Future<Output = Result<Vec<UpdateOutcome>, Self::Error>> + Send + '_;

  /// Apply a user correction and protect the field from automated writes.
  fn manual_correct(
    &self,
    correction: ManualCorrection,
  ) -> impl Future<Output = Result<ChangeRecord, Self::Error>> + Send + '_;

  /// Overwrite a field regardless of override protection.
  fn force_update(
    &self,
    update: ForcedUpdate,
  ) -> impl Future<Output = Result<ChangeRecord, Self::Error>> + Send + '_;

  /// Stamp an entity as verified by a human. Returns `None` if not found.
  fn mark_verified(
    &self,
    id: Uuid,
    user_id: String,
  ) -> impl Future<Output = Result<Option<DateTime<Utc>>, Self::Error>> + Send + '_;

  // ── Audit ─────────────────────────────────────────────────────────────

  /// Audit entries for one entity, oldest first, optionally only those
  /// recorded at or after `since`.
  fn audit_trail(
    &self,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;

  /// The whole chain in sequence order.
  fn audit_chain(
    &self,
  ) -> impl Future<Output = Result<Vec<AuditEntry>, Self::Error>> + Send + '_;

  /// Every change committed by a refresh session, oldest first.
  fn session_changes(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Vec<ChangeRecord>, Self::Error>> + Send + '_;

  // ── Sessions ──────────────────────────────────────────────────────────

  /// Insert or replace a session record.
  fn save_session(
    &self,
    session: RefreshSession,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_session(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<RefreshSession>, Self::Error>> + Send + '_;

  /// Most recently started first.
  fn list_sessions(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<RefreshSession>, Self::Error>> + Send + '_;
}
