//! Entities: the organizations being tracked.
//!
//! An entity holds only identity metadata. Its field values live in the field
//! store and are assembled into an [`EntityView`] on read.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::field::FieldValue;

/// A tracked organization. Entities are never deleted; `enabled = false` is
/// the soft-disable that removes them from "all" refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:    Uuid,
  /// Stable external key used by sources to look the entity up.
  pub slug:         String,
  pub display_name: String,
  pub enabled:      bool,
  pub created_at:   DateTime<Utc>,
}

/// The last explicit human verification of an entity's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
  pub verified_at: DateTime<Utc>,
  pub verified_by: String,
}

/// The computed read model for an entity. Never stored, always derived.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
  pub entity:        Entity,
  /// Current value of every field that has ever been populated.
  pub fields:        BTreeMap<String, FieldValue>,
  pub last_verified: Option<Verification>,
}

impl EntityView {
  pub fn field(&self, name: &str) -> Option<&FieldValue> { self.fields.get(name) }
}
