//! Plain-text rendering of API responses.

use std::fmt::Write as _;

use vantage_core::{
  change::{Actor, ChangeRecord},
  field::FieldData,
  quality::{QualityScore, StaleField},
  session::{RefreshSession, SessionProgress},
};

pub fn data(value: &FieldData) -> String {
  match value {
    FieldData::Text(s) | FieldData::Category(s) => s.clone(),
    FieldData::Number(n) => n.to_string(),
    FieldData::Money(m) => format!("{} {}", m.amount, m.currency),
    FieldData::List(items) => items.join(", "),
    FieldData::Flag(b) => b.to_string(),
  }
}

pub fn change(record: &ChangeRecord) -> String {
  let old = record.old_value.as_ref().map(data).unwrap_or_else(|| "∅".into());
  let mut line = format!(
    "[{:<6}] {} {}: {} → {} ({}, {})",
    record.severity.as_ref(),
    record.entity_id,
    record.field,
    old,
    data(&record.new_value),
    record.change_type,
    record.source_tier,
  );
  if let Actor::User { user_id } = &record.actor {
    let _ = write!(line, " by {user_id}");
  }
  if let Some(reason) = &record.reason {
    let _ = write!(line, ": {reason}");
  }
  line
}

/// One status line for a session in flight.
pub fn progress_line(p: &SessionProgress) -> String {
  format!(
    "{} {}/{} entities, {} changes ({} new), {} blocked, {} errors",
    p.status,
    p.completed,
    p.total,
    p.changes_detected,
    p.new_values_added,
    p.blocked_corrections,
    p.errors.len(),
  )
}

/// Final report once a session has stopped running.
pub fn progress_report(p: &SessionProgress) -> String {
  let mut out = progress_line(p);
  if let Some(reason) = &p.failure_reason {
    let _ = write!(out, "\nfailure: {reason}");
  }
  if let Some(summary) = &p.summary {
    let _ = write!(out, "\nsummary: {summary}");
  }
  for e in &p.errors {
    let field = e.field.as_deref().unwrap_or("-");
    let _ = write!(out, "\nerror [{}] {} {}: {}", e.kind, e.entity_id, field, e.message);
  }
  for record in &p.recent_changes {
    let _ = write!(out, "\n{}", change(record));
  }
  out
}

pub fn session_row(s: &RefreshSession) -> String {
  format!(
    "{}  {}  {:<9}  {:<9}  {}/{}  {} changes",
    s.session_id,
    s.started_at.format("%Y-%m-%d %H:%M:%S"),
    s.trigger.as_ref(),
    s.status.as_ref(),
    s.completed_count,
    s.target_count,
    s.changes_detected,
  )
}

pub fn quality_table(scores: &[QualityScore]) -> String {
  let mut out = format!(
    "{:<36}  {:>7}  {:>9}  {:>12}  {}",
    "entity", "quality", "freshness", "completeness", "healthy"
  );
  for s in scores {
    let _ = write!(
      out,
      "\n{:<36}  {:>7.1}  {:>9.1}  {:>12.1}  {}",
      s.entity_id.to_string(),
      s.quality,
      s.freshness,
      s.completeness,
      if s.healthy { "yes" } else { "no" },
    );
  }
  out
}

pub fn stale_table(stale: &[StaleField]) -> String {
  let mut out = format!("{:<24}  {:<16}  {:>9}  {:>6}", "entity", "field", "freshness", "days");
  for f in stale {
    let _ = write!(
      out,
      "\n{:<24}  {:<16}  {:>9.1}  {:>6.0}",
      f.entity_name, f.field, f.freshness, f.days_since_update,
    );
  }
  out
}
