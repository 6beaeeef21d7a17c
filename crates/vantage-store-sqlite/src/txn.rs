//! Synchronous transaction bodies run inside `tokio_rusqlite` closures.
//!
//! Each function takes the connection (or an open transaction, which derefs to
//! one) and performs a single logical read-modify-write. Callers wrap them in
//! a transaction so the field row and its audit entry commit together.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;
use vantage_core::{
  audit::AuditEntry,
  change::{self, Actor, ChangeRecord, ChangeType, Evaluation},
  field::{FieldSpec, FieldValue},
  store::{FieldUpdate, RejectReason, UpdateOutcome},
};

use crate::encode::{
  FIELD_COLUMNS, RawFieldValue, encode_data, encode_dt, encode_tier, encode_uuid,
};

pub type TxResult<T> = std::result::Result<T, tokio_rusqlite::Error>;

/// Wrap a crate-level error so it can cross the `tokio_rusqlite` boundary.
pub fn other(e: impl Into<crate::Error>) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(e.into()))
}

pub fn entity_exists(conn: &Connection, entity_id: &str) -> TxResult<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM entities WHERE entity_id = ?1",
        rusqlite::params![entity_id],
        |_| Ok(true),
      )
      .optional()?
      .unwrap_or(false),
  )
}

pub fn read_field(
  conn: &Connection,
  entity_id: &str,
  field: &str,
) -> TxResult<Option<FieldValue>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {FIELD_COLUMNS} FROM field_values WHERE entity_id = ?1 AND field = ?2"
      ),
      rusqlite::params![entity_id, field],
      RawFieldValue::from_row,
    )
    .optional()?;

  raw
    .map(|r| r.into_field_value().map(|(_, v)| v))
    .transpose()
    .map_err(other)
}

pub fn write_field(
  conn: &Connection,
  entity_id: &str,
  field: &str,
  value: &FieldValue,
) -> TxResult<()> {
  let value_json = encode_data(&value.value).map_err(other)?;
  conn.execute(
    "INSERT INTO field_values (
       entity_id, field, value_json, source_tier, confidence,
       last_updated, manually_corrected, correction_reason
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
     ON CONFLICT(entity_id, field) DO UPDATE SET
       value_json         = excluded.value_json,
       source_tier        = excluded.source_tier,
       confidence         = excluded.confidence,
       last_updated       = excluded.last_updated,
       manually_corrected = excluded.manually_corrected,
       correction_reason  = excluded.correction_reason",
    rusqlite::params![
      entity_id,
      field,
      value_json,
      encode_tier(value.source_tier),
      value.confidence.get(),
      encode_dt(value.last_updated),
      value.manually_corrected,
      value.correction_reason,
    ],
  )?;
  Ok(())
}

/// Append `record` to the hash chain.
pub fn append_audit(conn: &Connection, record: ChangeRecord) -> TxResult<AuditEntry> {
  let last: Option<(i64, String)> = conn
    .query_row(
      "SELECT sequence, hash FROM audit_log ORDER BY sequence DESC LIMIT 1",
      [],
      |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()?;

  let prev = last.as_ref().map(|(seq, hash)| (*seq as u64, hash.as_str()));
  let entry = AuditEntry::next(prev, record).map_err(other)?;
  let record_json = serde_json::to_string(&entry.record).map_err(other)?;

  conn.execute(
    "INSERT INTO audit_log (
       sequence, change_id, entity_id, field, session_id,
       recorded_at, record_json, prev_hash, hash
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
    rusqlite::params![
      entry.sequence as i64,
      encode_uuid(entry.record.change_id),
      encode_uuid(entry.record.entity_id),
      entry.record.field,
      entry.record.session_id.map(encode_uuid),
      encode_dt(entry.record.recorded_at),
      record_json,
      entry.prev_hash,
      entry.hash,
    ],
  )?;
  Ok(entry)
}

/// Build the change record for a committed write.
#[allow(clippy::too_many_arguments)]
pub fn change_record(
  entity_id: Uuid,
  spec: &FieldSpec,
  old: Option<&FieldValue>,
  new: &FieldValue,
  change_type: ChangeType,
  actor: Actor,
  reason: Option<String>,
  session_id: Option<Uuid>,
) -> ChangeRecord {
  let (_, severity) = change::classify(spec, old.map(|o| &o.value), &new.value);
  ChangeRecord {
    change_id: Uuid::new_v4(),
    entity_id,
    field: spec.name.clone(),
    old_value: old.map(|o| o.value.clone()),
    new_value: new.value.clone(),
    change_type,
    severity,
    source_tier: new.source_tier,
    actor,
    reason,
    session_id,
    recorded_at: new.last_updated,
  }
}

/// The automated write path for one field: evaluate under the current row,
/// then either do nothing, refuse, or write + audit.
pub fn apply_proposal(
  conn: &Connection,
  update: FieldUpdate,
  now: DateTime<Utc>,
) -> TxResult<UpdateOutcome> {
  if !update.source_tier.is_automated() {
    return Ok(UpdateOutcome::Rejected(RejectReason::ManualTier));
  }
  if update.spec.check_kind(&update.value).is_err() {
    return Ok(UpdateOutcome::Rejected(RejectReason::KindMismatch));
  }

  let entity_id = encode_uuid(update.entity_id);
  if !entity_exists(conn, &entity_id)? {
    return Ok(UpdateOutcome::Rejected(RejectReason::EntityNotFound));
  }

  let current = read_field(conn, &entity_id, &update.spec.name)?;
  match change::evaluate(&update.spec, current.as_ref(), &update.value) {
    Evaluation::Unchanged => Ok(UpdateOutcome::Unchanged),
    Evaluation::Blocked => Ok(UpdateOutcome::Rejected(RejectReason::OverrideBlocked {
      correction_reason: current.and_then(|c| c.correction_reason),
    })),
    Evaluation::Change { change_type, .. } => {
      let new = FieldValue {
        value:              update.value,
        source_tier:        update.source_tier,
        confidence:         update.confidence,
        last_updated:       now,
        manually_corrected: false,
        correction_reason:  None,
      };
      write_field(conn, &entity_id, &update.spec.name, &new)?;

      let record = change_record(
        update.entity_id,
        &update.spec,
        current.as_ref(),
        &new,
        change_type,
        Actor::System,
        None,
        update.session_id,
      );
      let entry = append_audit(conn, record)?;
      Ok(UpdateOutcome::Applied(entry.record))
    }
  }
}

/// Write a value on behalf of a user, bypassing change evaluation, so an
/// unchanged value is still audited. Returns `None` if the entity does not
/// exist.
pub fn apply_user_write(
  conn: &Connection,
  entity_id: Uuid,
  spec: &FieldSpec,
  new: FieldValue,
  user_id: String,
  reason: String,
) -> TxResult<Option<ChangeRecord>> {
  let id_str = encode_uuid(entity_id);
  if !entity_exists(conn, &id_str)? {
    return Ok(None);
  }

  let current = read_field(conn, &id_str, &spec.name)?;
  write_field(conn, &id_str, &spec.name, &new)?;

  let change_type =
    if current.is_some() { ChangeType::Updated } else { ChangeType::New };
  let record = change_record(
    entity_id,
    spec,
    current.as_ref(),
    &new,
    change_type,
    Actor::User { user_id },
    Some(reason),
    None,
  );
  Ok(Some(append_audit(conn, record)?.record))
}
