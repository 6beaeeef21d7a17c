//! Tamper-evident audit chain.
//!
//! Every field store mutation is appended as an [`AuditEntry`]. Entries form a
//! hash chain: each hash covers the entry's sequence number, the previous
//! entry's hash, and the canonical JSON of its [`ChangeRecord`]. Editing,
//! deleting, or reordering any entry breaks every hash after it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Result, change::ChangeRecord};

/// The `prev_hash` of the first entry in the chain.
pub const GENESIS_HASH: &str =
  "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
  /// 1-based, gap-free position in the chain.
  pub sequence:  u64,
  pub record:    ChangeRecord,
  pub prev_hash: String,
  pub hash:      String,
}

impl AuditEntry {
  /// Build the entry that follows `prev` (or starts the chain).
  pub fn next(prev: Option<(u64, &str)>, record: ChangeRecord) -> Result<Self> {
    let (sequence, prev_hash) = match prev {
      Some((seq, hash)) => (seq + 1, hash.to_owned()),
      None => (1, GENESIS_HASH.to_owned()),
    };
    let hash = compute_hash(sequence, &prev_hash, &record)?;
    Ok(Self { sequence, record, prev_hash, hash })
  }
}

/// SHA-256 over `sequence (LE) || prev_hash || json(record)`, hex encoded.
pub fn compute_hash(sequence: u64, prev_hash: &str, record: &ChangeRecord) -> Result<String> {
  let mut hasher = Sha256::new();
  hasher.update(sequence.to_le_bytes());
  hasher.update(prev_hash.as_bytes());
  hasher.update(serde_json::to_vec(record)?);
  Ok(hex::encode(hasher.finalize()))
}

/// The outcome of walking the full chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerification {
  pub entries:      u64,
  pub valid:        bool,
  /// Sequence number of the first entry that fails verification.
  pub first_broken: Option<u64>,
}

/// Verify a complete chain, given in sequence order.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<AuditVerification> {
  let mut expected_prev = GENESIS_HASH.to_owned();
  for (idx, entry) in entries.iter().enumerate() {
    let expected_seq = idx as u64 + 1;
    let recomputed = compute_hash(entry.sequence, &entry.prev_hash, &entry.record)?;
    if entry.sequence != expected_seq
      || entry.prev_hash != expected_prev
      || entry.hash != recomputed
    {
      return Ok(AuditVerification {
        entries:      entries.len() as u64,
        valid:        false,
        first_broken: Some(expected_seq),
      });
    }
    expected_prev = entry.hash.clone();
  }
  Ok(AuditVerification {
    entries:      entries.len() as u64,
    valid:        true,
    first_broken: None,
  })
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{
    change::{Actor, ChangeType},
    field::{FieldData, Severity, SourceTier},
  };

  fn record(text: &str) -> ChangeRecord {
    ChangeRecord {
      change_id:   Uuid::new_v4(),
      entity_id:   Uuid::new_v4(),
      field:       "tagline".into(),
      old_value:   None,
      new_value:   FieldData::Text(text.into()),
      change_type: ChangeType::New,
      severity:    Severity::Low,
      source_tier: SourceTier::Live,
      actor:       Actor::System,
      reason:      None,
      session_id:  None,
      recorded_at: Utc::now(),
    }
  }

  fn chain(n: usize) -> Vec<AuditEntry> {
    let mut out: Vec<AuditEntry> = Vec::new();
    for i in 0..n {
      let prev = out.last().map(|e| (e.sequence, e.hash.as_str()));
      let entry = AuditEntry::next(prev, record(&format!("v{i}"))).unwrap();
      out.push(entry);
    }
    out
  }

  #[test]
  fn intact_chain_verifies() {
    let entries = chain(4);
    assert_eq!(entries[0].prev_hash, GENESIS_HASH);
    let v = verify_chain(&entries).unwrap();
    assert!(v.valid);
    assert_eq!(v.entries, 4);
  }

  #[test]
  fn edited_record_is_detected() {
    let mut entries = chain(4);
    entries[2].record.new_value = FieldData::Text("forged".into());
    let v = verify_chain(&entries).unwrap();
    assert!(!v.valid);
    assert_eq!(v.first_broken, Some(3));
  }

  #[test]
  fn deleted_entry_is_detected() {
    let mut entries = chain(4);
    entries.remove(1);
    let v = verify_chain(&entries).unwrap();
    assert_eq!(v.first_broken, Some(2));
  }

  #[test]
  fn empty_chain_is_valid() {
    assert!(verify_chain(&[]).unwrap().valid);
  }
}
