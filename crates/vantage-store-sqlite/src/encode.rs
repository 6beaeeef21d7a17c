//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Structured values
//! (FieldData, ChangeRecord, RefreshSession) are stored as compact JSON. UUIDs
//! are stored as hyphenated lowercase strings.

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vantage_core::{
  audit::AuditEntry,
  change::ChangeRecord,
  entity::{Entity, Verification},
  field::{Confidence, FieldData, FieldValue, SourceTier},
  session::RefreshSession,
};

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── SourceTier ───────────────────────────────────────────────────────────────

pub fn encode_tier(tier: SourceTier) -> &'static str {
  match tier {
    SourceTier::Live => "live",
    SourceTier::Secondary => "secondary",
    SourceTier::KnownFallback => "known_fallback",
    SourceTier::Manual => "manual",
  }
}

pub fn decode_tier(s: &str) -> Result<SourceTier> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown source tier: {s:?}")))
}

// ─── FieldData ────────────────────────────────────────────────────────────────

pub fn encode_data(value: &FieldData) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_data(s: &str) -> Result<FieldData> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub entity_id:    String,
  pub slug:         String,
  pub display_name: String,
  pub enabled:      bool,
  pub created_at:   String,
}

pub const ENTITY_COLUMNS: &str = "entity_id, slug, display_name, enabled, created_at";

impl RawEntity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:    row.get(0)?,
      slug:         row.get(1)?,
      display_name: row.get(2)?,
      enabled:      row.get(3)?,
      created_at:   row.get(4)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    Ok(Entity {
      entity_id:    decode_uuid(&self.entity_id)?,
      slug:         self.slug,
      display_name: self.display_name,
      enabled:      self.enabled,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from a `field_values` row.
pub struct RawFieldValue {
  pub field:              String,
  pub value_json:         String,
  pub source_tier:        String,
  pub confidence:         i64,
  pub last_updated:       String,
  pub manually_corrected: bool,
  pub correction_reason:  Option<String>,
}

pub const FIELD_COLUMNS: &str = "field, value_json, source_tier, confidence, \
                                 last_updated, manually_corrected, correction_reason";

impl RawFieldValue {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      field:              row.get(0)?,
      value_json:         row.get(1)?,
      source_tier:        row.get(2)?,
      confidence:         row.get(3)?,
      last_updated:       row.get(4)?,
      manually_corrected: row.get(5)?,
      correction_reason:  row.get(6)?,
    })
  }

  pub fn into_field_value(self) -> Result<(String, FieldValue)> {
    let confidence = u8::try_from(self.confidence)
      .map_err(|_| Error::Decode(format!("confidence out of range: {}", self.confidence)))?;
    let value = FieldValue {
      value:              decode_data(&self.value_json)?,
      source_tier:        decode_tier(&self.source_tier)?,
      confidence:         Confidence::new(confidence),
      last_updated:       decode_dt(&self.last_updated)?,
      manually_corrected: self.manually_corrected,
      correction_reason:  self.correction_reason,
    };
    Ok((self.field, value))
  }
}

/// Raw strings read directly from an `audit_log` row.
pub struct RawAuditEntry {
  pub sequence:    i64,
  pub record_json: String,
  pub prev_hash:   String,
  pub hash:        String,
}

pub const AUDIT_COLUMNS: &str = "sequence, record_json, prev_hash, hash";

impl RawAuditEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      sequence:    row.get(0)?,
      record_json: row.get(1)?,
      prev_hash:   row.get(2)?,
      hash:        row.get(3)?,
    })
  }

  pub fn into_entry(self) -> Result<AuditEntry> {
    let sequence = u64::try_from(self.sequence)
      .map_err(|_| Error::Decode(format!("negative audit sequence {}", self.sequence)))?;
    let record: ChangeRecord = serde_json::from_str(&self.record_json)?;
    Ok(AuditEntry {
      sequence,
      record,
      prev_hash: self.prev_hash,
      hash: self.hash,
    })
  }
}

/// Raw strings read directly from a `verifications` row.
pub struct RawVerification {
  pub verified_at: String,
  pub verified_by: String,
}

impl RawVerification {
  pub fn into_verification(self) -> Result<Verification> {
    Ok(Verification {
      verified_at: decode_dt(&self.verified_at)?,
      verified_by: self.verified_by,
    })
  }
}

pub fn decode_session(json: &str) -> Result<RefreshSession> {
  Ok(serde_json::from_str(json)?)
}
