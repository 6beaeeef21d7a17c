//! Change records and the classification rules behind them.
//!
//! A [`ChangeRecord`] is an immutable fact: exactly one is created per
//! committed difference. Comparisons that find nothing to change never produce
//! a record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::field::{FieldData, FieldSpec, FieldValue, Severity, SourceTier};

/// Whether a change introduced a value or replaced one.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeType {
  /// The field had no prior value.
  New,
  /// The field held a different non-null value.
  Updated,
}

/// Who caused a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Actor {
  /// An automated refresh.
  System,
  User { user_id: String },
}

impl Actor {
  pub fn user(user_id: impl Into<String>) -> Self {
    Self::User { user_id: user_id.into() }
  }
}

/// An immutable record of one committed field change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
  pub change_id:   Uuid,
  pub entity_id:   Uuid,
  pub field:       String,
  pub old_value:   Option<FieldData>,
  pub new_value:   FieldData,
  pub change_type: ChangeType,
  pub severity:    Severity,
  pub source_tier: SourceTier,
  pub actor:       Actor,
  /// Free-text justification; always present for manual and forced writes.
  pub reason:      Option<String>,
  /// The refresh session that committed this change, if any.
  pub session_id:  Option<Uuid>,
  pub recorded_at: DateTime<Utc>,
}

// ─── Classification ──────────────────────────────────────────────────────────

/// The verdict of comparing a proposed automated value with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
  /// Equal under the field's equality; nothing to write.
  Unchanged,
  /// Different, but the current value is manually corrected.
  Blocked,
  /// Different and writable.
  Change {
    change_type: ChangeType,
    severity:    Severity,
  },
}

/// Decide what an automated proposal would do to `current`.
///
/// Equality is checked before override protection, so re-resolving the value a
/// user already entered is a silent no-op rather than a blocked correction.
pub fn evaluate(
  spec: &FieldSpec,
  current: Option<&FieldValue>,
  proposed: &FieldData,
) -> Evaluation {
  if let Some(cur) = current
    && spec.values_equal(&cur.value, proposed)
  {
    return Evaluation::Unchanged;
  }
  if current.is_some_and(|cur| cur.manually_corrected) {
    return Evaluation::Blocked;
  }
  let (change_type, severity) =
    classify(spec, current.map(|c| &c.value), proposed);
  Evaluation::Change { change_type, severity }
}

/// Classify a transition from `old` to `new`.
///
/// Severity starts at the field's configured importance and escalates one
/// level when a numeric value moves by at least `major_change_ratio`.
pub fn classify(
  spec: &FieldSpec,
  old: Option<&FieldData>,
  new: &FieldData,
) -> (ChangeType, Severity) {
  let Some(old) = old else {
    return (ChangeType::New, spec.importance);
  };

  let severity = match relative_change(old, new) {
    Some(ratio) if ratio >= spec.major_change_ratio => spec.importance.escalate(),
    _ => spec.importance,
  };
  (ChangeType::Updated, severity)
}

/// `|new - old| / |old|` for numeric values; infinite when `old` is zero.
fn relative_change(old: &FieldData, new: &FieldData) -> Option<f64> {
  let (a, b) = (old.as_number()?, new.as_number()?);
  if a == 0.0 {
    return Some(if b == 0.0 { 0.0 } else { f64::INFINITY });
  }
  Some(((b - a) / a).abs())
}

#[cfg(test)]
mod tests {
  use chrono::Utc;

  use super::*;
  use crate::field::{Confidence, FieldKind};

  fn current(value: FieldData, manually_corrected: bool) -> FieldValue {
    FieldValue {
      value,
      source_tier: SourceTier::Live,
      confidence: Confidence::new(90),
      last_updated: Utc::now(),
      manually_corrected,
      correction_reason: None,
    }
  }

  fn pricing() -> FieldSpec {
    FieldSpec::new("pricing_model", FieldKind::Category).importance(Severity::High)
  }

  #[test]
  fn null_to_value_is_new() {
    let verdict = evaluate(&pricing(), None, &FieldData::Category("usage-based".into()));
    assert_eq!(
      verdict,
      Evaluation::Change { change_type: ChangeType::New, severity: Severity::High }
    );
  }

  #[test]
  fn value_to_different_value_is_updated() {
    let cur = current(FieldData::Category("subscription".into()), false);
    let verdict =
      evaluate(&pricing(), Some(&cur), &FieldData::Category("usage-based".into()));
    assert_eq!(
      verdict,
      Evaluation::Change { change_type: ChangeType::Updated, severity: Severity::High }
    );
  }

  #[test]
  fn equal_values_are_unchanged_even_when_corrected() {
    let cur = current(FieldData::Category("subscription".into()), true);
    let verdict =
      evaluate(&pricing(), Some(&cur), &FieldData::Category("subscription".into()));
    assert_eq!(verdict, Evaluation::Unchanged);
  }

  #[test]
  fn corrected_values_block_differing_proposals() {
    let cur = current(FieldData::Category("subscription".into()), true);
    let verdict =
      evaluate(&pricing(), Some(&cur), &FieldData::Category("usage-based".into()));
    assert_eq!(verdict, Evaluation::Blocked);
  }

  #[test]
  fn large_numeric_moves_escalate_severity() {
    let spec = FieldSpec::new("employee_count", FieldKind::Number);
    let (_, minor) =
      classify(&spec, Some(&FieldData::Number(100.0)), &FieldData::Number(110.0));
    let (_, major) =
      classify(&spec, Some(&FieldData::Number(100.0)), &FieldData::Number(160.0));
    assert_eq!(minor, Severity::Medium);
    assert_eq!(major, Severity::High);
  }

  #[test]
  fn moving_off_zero_is_major() {
    let spec = FieldSpec::new("funding_total", FieldKind::Number).importance(Severity::Low);
    let (kind, severity) =
      classify(&spec, Some(&FieldData::Number(0.0)), &FieldData::Number(5.0));
    assert_eq!(kind, ChangeType::Updated);
    assert_eq!(severity, Severity::Medium);
  }
}
