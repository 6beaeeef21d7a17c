//! Refresh session records and progress snapshots.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::change::{ChangeRecord, ChangeType};

/// What caused a refresh.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RefreshTrigger {
  #[default]
  Manual,
  Scheduled,
}

/// The entities a refresh should cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "entity_ids", rename_all = "snake_case")]
pub enum RefreshTarget {
  /// Every enabled entity.
  All,
  /// Exactly these entities, enabled or not.
  Entities(BTreeSet<Uuid>),
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
  Running,
  Completed,
  Failed,
}

/// Per-entity or per-field failures absorbed into a session.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionErrorKind {
  /// Every tier failed for a field.
  SourceUnavailable,
  /// A value could not be accepted for a field.
  ValidationError,
  /// The entity could not be processed at all.
  EntityFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionError {
  pub entity_id: Uuid,
  pub field:     Option<String>,
  pub kind:      SessionErrorKind,
  pub message:   String,
  pub at:        DateTime<Utc>,
}

/// One execution of the refresh orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshSession {
  pub session_id:          Uuid,
  pub trigger:             RefreshTrigger,
  pub status:              SessionStatus,
  pub started_at:          DateTime<Utc>,
  pub completed_at:        Option<DateTime<Utc>>,
  pub target_count:        usize,
  /// Entities whose unit has reported back, successfully or not.
  pub completed_count:     usize,
  /// Every committed change (new and updated).
  pub changes_detected:    usize,
  /// The subset of `changes_detected` that filled a previously empty field.
  pub new_values_added:    usize,
  /// Automated proposals rejected by override protection.
  pub blocked_corrections: usize,
  pub errors:              Vec<SessionError>,
  /// The most recent changes, newest last, capped for live display.
  pub recent_changes:      Vec<ChangeRecord>,
  pub summary:             Option<String>,
  pub failure_reason:      Option<String>,
}

impl RefreshSession {
  pub fn begin(trigger: RefreshTrigger, target_count: usize) -> Self {
    Self {
      session_id: Uuid::new_v4(),
      trigger,
      status: SessionStatus::Running,
      started_at: Utc::now(),
      completed_at: None,
      target_count,
      completed_count: 0,
      changes_detected: 0,
      new_values_added: 0,
      blocked_corrections: 0,
      errors: Vec::new(),
      recent_changes: Vec::new(),
      summary: None,
      failure_reason: None,
    }
  }

  pub fn is_running(&self) -> bool { self.status == SessionStatus::Running }

  /// Count a committed change and push it onto the capped rolling window.
  pub fn record_change(&mut self, record: ChangeRecord, cap: usize) {
    self.changes_detected += 1;
    if record.change_type == ChangeType::New {
      self.new_values_added += 1;
    }
    self.recent_changes.push(record);
    if self.recent_changes.len() > cap {
      let excess = self.recent_changes.len() - cap;
      self.recent_changes.drain(..excess);
    }
  }

  /// Close the session. Has no effect on a session that is already closed.
  pub fn finish(&mut self, status: SessionStatus, failure_reason: Option<String>) {
    if !self.is_running() {
      return;
    }
    self.status = status;
    self.failure_reason = failure_reason;
    self.completed_at = Some(Utc::now());
  }

  pub fn progress(&self) -> SessionProgress {
    SessionProgress {
      session_id:          self.session_id,
      status:              self.status,
      completed:           self.completed_count,
      total:               self.target_count,
      changes_detected:    self.changes_detected,
      new_values_added:    self.new_values_added,
      blocked_corrections: self.blocked_corrections,
      errors:              self.errors.clone(),
      recent_changes:      self.recent_changes.clone(),
      summary:             self.summary.clone(),
      failure_reason:      self.failure_reason.clone(),
    }
  }
}

/// An immutable snapshot of a session handed to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProgress {
  pub session_id:          Uuid,
  pub status:              SessionStatus,
  pub completed:           usize,
  pub total:               usize,
  pub changes_detected:    usize,
  pub new_values_added:    usize,
  pub blocked_corrections: usize,
  pub errors:              Vec<SessionError>,
  pub recent_changes:      Vec<ChangeRecord>,
  /// Set once the session has finished and been summarised.
  pub summary:             Option<String>,
  pub failure_reason:      Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    change::Actor,
    field::{FieldData, Severity, SourceTier},
  };

  fn change(change_type: ChangeType, n: usize) -> ChangeRecord {
    ChangeRecord {
      change_id: Uuid::new_v4(),
      entity_id: Uuid::nil(),
      field: format!("f{n}"),
      old_value: None,
      new_value: FieldData::Flag(true),
      change_type,
      severity: Severity::Low,
      source_tier: SourceTier::Live,
      actor: Actor::System,
      reason: None,
      session_id: None,
      recorded_at: Utc::now(),
    }
  }

  #[test]
  fn recent_changes_are_capped_keeping_newest() {
    let mut s = RefreshSession::begin(RefreshTrigger::Manual, 1);
    for n in 0..5 {
      s.record_change(change(ChangeType::Updated, n), 3);
    }
    assert_eq!(s.changes_detected, 5);
    let fields: Vec<_> = s.recent_changes.iter().map(|c| c.field.as_str()).collect();
    assert_eq!(fields, ["f2", "f3", "f4"]);
  }

  #[test]
  fn new_values_are_counted_separately() {
    let mut s = RefreshSession::begin(RefreshTrigger::Manual, 1);
    s.record_change(change(ChangeType::New, 0), 10);
    s.record_change(change(ChangeType::Updated, 1), 10);
    assert_eq!(s.changes_detected, 2);
    assert_eq!(s.new_values_added, 1);
  }

  #[test]
  fn finish_is_final() {
    let mut s = RefreshSession::begin(RefreshTrigger::Scheduled, 0);
    s.finish(SessionStatus::Failed, Some("aborted".into()));
    s.finish(SessionStatus::Completed, None);
    assert_eq!(s.status, SessionStatus::Failed);
    assert_eq!(s.failure_reason.as_deref(), Some("aborted"));
    assert!(s.completed_at.is_some());
  }

  #[test]
  fn target_serializes_with_scope_tag() {
    let all = serde_json::to_value(RefreshTarget::All).unwrap();
    assert_eq!(all, serde_json::json!({ "scope": "all" }));
    let parsed: RefreshTarget = serde_json::from_value(serde_json::json!({
      "scope": "entities",
      "entity_ids": [Uuid::nil()],
    }))
    .unwrap();
    assert!(matches!(parsed, RefreshTarget::Entities(ids) if ids.len() == 1));
  }
}
