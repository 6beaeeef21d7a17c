//! [`SqliteStore`] — the SQLite implementation of [`FieldStore`].

use std::{collections::BTreeMap, path::Path};

use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;
use vantage_core::{
  audit::AuditEntry,
  change::ChangeRecord,
  entity::{Entity, EntityView},
  field::{Confidence, FieldValue, SourceTier},
  session::RefreshSession,
  store::{FieldStore, FieldUpdate, ForcedUpdate, ManualCorrection, UpdateOutcome},
};

use crate::{
  Error, Result,
  encode::{
    AUDIT_COLUMNS, ENTITY_COLUMNS, FIELD_COLUMNS, RawAuditEntry, RawEntity,
    RawFieldValue, RawVerification, decode_session, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
  txn,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Vantage field store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Close the underlying connection. Every later call fails with a
  /// database error.
  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a user write (manual or forced) in its own transaction.
  async fn user_write(
    &self,
    entity_id: Uuid,
    spec: vantage_core::field::FieldSpec,
    new: FieldValue,
    user_id: String,
    reason: String,
  ) -> Result<ChangeRecord> {
    spec.check_kind(&new.value)?;

    let record = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let record = txn::apply_user_write(&tx, entity_id, &spec, new, user_id, reason)?;
        tx.commit()?;
        Ok(record)
      })
      .await?;

    record.ok_or(Error::EntityNotFound(entity_id))
  }
}

// ─── FieldStore impl ─────────────────────────────────────────────────────────

impl FieldStore for SqliteStore {
  type Error = Error;

  fn is_duplicate_slug(err: &Error) -> bool { matches!(err, Error::DuplicateSlug(_)) }

  // ── Entities ──────────────────────────────────────────────────────────────

  async fn add_entity(&self, slug: String, display_name: String) -> Result<Entity> {
    let entity = Entity {
      entity_id: Uuid::new_v4(),
      slug,
      display_name,
      enabled: true,
      created_at: Utc::now(),
    };

    let id_str   = encode_uuid(entity.entity_id);
    let slug     = entity.slug.clone();
    let name     = entity.display_name.clone();
    let at_str   = encode_dt(entity.created_at);

    let inserted: bool = self
      .conn
      .call(move |conn| {
        let taken: bool = conn
          .query_row(
            "SELECT 1 FROM entities WHERE slug = ?1",
            rusqlite::params![slug],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);
        if taken {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO entities (entity_id, slug, display_name, enabled, created_at)
           VALUES (?1, ?2, ?3, 1, ?4)",
          rusqlite::params![id_str, slug, name, at_str],
        )?;
        Ok(true)
      })
      .await?;

    if !inserted {
      return Err(Error::DuplicateSlug(entity.slug));
    }
    tracing::debug!(entity_id = %entity.entity_id, slug = %entity.slug, "entity added");
    Ok(entity)
  }

  async fn get_entity(&self, id: Uuid) -> Result<Option<Entity>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawEntity> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ENTITY_COLUMNS} FROM entities WHERE entity_id = ?1"),
              rusqlite::params![id_str],
              RawEntity::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEntity::into_entity).transpose()
  }

  async fn list_entities(&self, include_disabled: bool) -> Result<Vec<Entity>> {
    let raws: Vec<RawEntity> = self
      .conn
      .call(move |conn| {
        let sql = if include_disabled {
          format!("SELECT {ENTITY_COLUMNS} FROM entities ORDER BY display_name")
        } else {
          format!(
            "SELECT {ENTITY_COLUMNS} FROM entities WHERE enabled = 1 ORDER BY display_name"
          )
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map([], RawEntity::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawEntity::into_entity).collect()
  }

  async fn set_entity_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<Entity>> {
    let id_str = encode_uuid(id);
    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE entities SET enabled = ?2 WHERE entity_id = ?1",
          rusqlite::params![id_str, enabled],
        )?)
      })
      .await?;

    if changed == 0 {
      return Ok(None);
    }
    tracing::info!(entity_id = %id, enabled, "entity enablement changed");
    self.get_entity(id).await
  }

  async fn materialize(&self, id: Uuid) -> Result<Option<EntityView>> {
    let entity = match self.get_entity(id).await? {
      Some(e) => e,
      None    => return Ok(None),
    };

    let id_str = encode_uuid(id);
    let (raw_fields, raw_verification): (Vec<RawFieldValue>, Option<RawVerification>) = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FIELD_COLUMNS} FROM field_values WHERE entity_id = ?1"
        ))?;
        let fields = stmt
          .query_map(rusqlite::params![id_str], RawFieldValue::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;

        let verification = conn
          .query_row(
            "SELECT verified_at, verified_by FROM verifications WHERE entity_id = ?1",
            rusqlite::params![id_str],
            |row| {
              Ok(RawVerification {
                verified_at: row.get(0)?,
                verified_by: row.get(1)?,
              })
            },
          )
          .optional()?;

        Ok((fields, verification))
      })
      .await?;

    let fields = raw_fields
      .into_iter()
      .map(RawFieldValue::into_field_value)
      .collect::<Result<BTreeMap<_, _>>>()?;
    let last_verified = raw_verification
      .map(RawVerification::into_verification)
      .transpose()?;

    Ok(Some(EntityView { entity, fields, last_verified }))
  }

  async fn get_field<'a>(&'a self, id: Uuid, field: &'a str) -> Result<Option<FieldValue>> {
    let id_str = encode_uuid(id);
    let field  = field.to_owned();
    Ok(
      self
        .conn
        .call(move |conn| txn::read_field(conn, &id_str, &field))
        .await?,
    )
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn propose_update(&self, update: FieldUpdate) -> Result<UpdateOutcome> {
    let mut outcomes = self.propose_updates(vec![update]).await?;
    outcomes
      .pop()
      .ok_or_else(|| Error::Decode("empty batch outcome".into()))
  }

  async fn propose_updates(&self, updates: Vec<FieldUpdate>) -> Result<Vec<UpdateOutcome>> {
    if updates.is_empty() {
      return Ok(Vec::new());
    }
    let now = Utc::now();

    let outcomes = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let outcomes = updates
          .into_iter()
          .map(|u| txn::apply_proposal(&tx, u, now))
          .collect::<txn::TxResult<Vec<_>>>()?;
        tx.commit()?;
        Ok(outcomes)
      })
      .await?;

    Ok(outcomes)
  }

  async fn manual_correct(&self, correction: ManualCorrection) -> Result<ChangeRecord> {
    let new = FieldValue {
      value:              correction.value,
      source_tier:        SourceTier::Manual,
      confidence:         Confidence::MAX,
      last_updated:       Utc::now(),
      manually_corrected: true,
      correction_reason:  Some(correction.reason.clone()),
    };
    let record = self
      .user_write(
        correction.entity_id,
        correction.spec,
        new,
        correction.user_id,
        correction.reason,
      )
      .await?;
    tracing::info!(
      entity_id = %record.entity_id,
      field = %record.field,
      actor = ?record.actor,
      "manual correction applied"
    );
    Ok(record)
  }

  async fn force_update(&self, update: ForcedUpdate) -> Result<ChangeRecord> {
    let new = FieldValue {
      value:              update.value,
      source_tier:        update.source_tier,
      confidence:         update.confidence,
      last_updated:       Utc::now(),
      manually_corrected: false,
      correction_reason:  None,
    };
    let record = self
      .user_write(update.entity_id, update.spec, new, update.user_id, update.reason)
      .await?;
    tracing::warn!(
      entity_id = %record.entity_id,
      field = %record.field,
      actor = ?record.actor,
      "forced overwrite applied; override protection cleared"
    );
    Ok(record)
  }

  async fn mark_verified(&self, id: Uuid, user_id: String) -> Result<Option<DateTime<Utc>>> {
    let now    = Utc::now();
    let id_str = encode_uuid(id);
    let at_str = encode_dt(now);

    let found = self
      .conn
      .call(move |conn| {
        if !txn::entity_exists(conn, &id_str)? {
          return Ok(false);
        }
        conn.execute(
          "INSERT INTO verifications (entity_id, verified_at, verified_by)
           VALUES (?1, ?2, ?3)
           ON CONFLICT(entity_id) DO UPDATE SET
             verified_at = excluded.verified_at,
             verified_by = excluded.verified_by",
          rusqlite::params![id_str, at_str, user_id],
        )?;
        Ok(true)
      })
      .await?;

    Ok(found.then_some(now))
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  async fn audit_trail(
    &self,
    entity_id: Uuid,
    since:     Option<DateTime<Utc>>,
  ) -> Result<Vec<AuditEntry>> {
    let id_str = encode_uuid(entity_id);

    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_log
           WHERE entity_id = ?1
           ORDER BY sequence"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawAuditEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    // Filter after decoding: RFC 3339 strings with differing offsets do not
    // compare lexically.
    let mut entries = raws
      .into_iter()
      .map(RawAuditEntry::into_entry)
      .collect::<Result<Vec<_>>>()?;
    if let Some(since) = since {
      entries.retain(|e| e.record.recorded_at >= since);
    }
    Ok(entries)
  }

  async fn audit_chain(&self) -> Result<Vec<AuditEntry>> {
    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(|conn| {
        let mut stmt =
          conn.prepare(&format!("SELECT {AUDIT_COLUMNS} FROM audit_log ORDER BY sequence"))?;
        let rows = stmt
          .query_map([], RawAuditEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawAuditEntry::into_entry).collect()
  }

  async fn session_changes(&self, session_id: Uuid) -> Result<Vec<ChangeRecord>> {
    let id_str = encode_uuid(session_id);

    let raws: Vec<RawAuditEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {AUDIT_COLUMNS} FROM audit_log WHERE session_id = ?1 ORDER BY sequence"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawAuditEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws
      .into_iter()
      .map(|r| r.into_entry().map(|e| e.record))
      .collect()
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  async fn save_session(&self, session: RefreshSession) -> Result<()> {
    let id_str     = encode_uuid(session.session_id);
    let started_at = encode_dt(session.started_at);
    let status     = session.status.as_ref().to_owned();
    let json       = serde_json::to_string(&session)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO refresh_sessions (session_id, started_at, status, session_json)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT(session_id) DO UPDATE SET
             status       = excluded.status,
             session_json = excluded.session_json",
          rusqlite::params![id_str, started_at, status, json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_session(&self, id: Uuid) -> Result<Option<RefreshSession>> {
    let id_str = encode_uuid(id);

    let json: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT session_json FROM refresh_sessions WHERE session_id = ?1",
              rusqlite::params![id_str],
              |row| row.get(0),
            )
            .optional()?,
        )
      })
      .await?;

    json.as_deref().map(decode_session).transpose()
  }

  async fn list_sessions(&self, limit: usize) -> Result<Vec<RefreshSession>> {
    let limit_val = limit as i64;

    let rows: Vec<String> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT session_json FROM refresh_sessions
           ORDER BY started_at DESC
           LIMIT ?1",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![limit_val], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(rows)
      })
      .await?;

    rows.iter().map(|json| decode_session(json)).collect()
  }
}
