//! Field values, provenance tiers, and the field catalog.
//!
//! A [`FieldValue`] is the current state of one tracked field of one entity.
//! It is never deleted, only superseded; every supersession is recorded in the
//! audit trail. The [`FieldCatalog`] decides which fields are tracked and how
//! each one is compared, weighted, and aged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

// ─── Provenance ──────────────────────────────────────────────────────────────

/// A ranked category of data source. Automated resolution consults `Live`,
/// then `Secondary`, then `KnownFallback`; `Manual` is only ever written by a
/// user correction.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SourceTier {
  Live,
  Secondary,
  KnownFallback,
  Manual,
}

impl SourceTier {
  /// The tiers an automated refresh may consult, in priority order.
  pub const AUTOMATED: [SourceTier; 3] =
    [SourceTier::Live, SourceTier::Secondary, SourceTier::KnownFallback];

  pub fn is_automated(self) -> bool { !matches!(self, Self::Manual) }
}

/// How sure we are about a value, on a 0–100 scale. Out-of-range inputs are
/// clamped to 100.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "u8", into = "u8")]
pub struct Confidence(u8);

impl Confidence {
  pub const MAX: Confidence = Confidence(100);

  pub fn new(value: u8) -> Self { Self(value.min(100)) }

  pub fn get(self) -> u8 { self.0 }
}

impl From<u8> for Confidence {
  fn from(value: u8) -> Self { Self::new(value) }
}

impl From<Confidence> for u8 {
  fn from(value: Confidence) -> Self { value.0 }
}

// ─── Values ──────────────────────────────────────────────────────────────────

/// A monetary amount. Currency codes compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoneyValue {
  pub amount:   f64,
  pub currency: String,
}

/// The typed payload of a field. The variant name is the field's kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FieldData {
  Text(String),
  Number(f64),
  Money(MoneyValue),
  /// A value from a small closed vocabulary, e.g. a pricing model.
  Category(String),
  List(Vec<String>),
  Flag(bool),
}

impl FieldData {
  pub fn kind(&self) -> FieldKind {
    match self {
      Self::Text(_) => FieldKind::Text,
      Self::Number(_) => FieldKind::Number,
      Self::Money(_) => FieldKind::Money,
      Self::Category(_) => FieldKind::Category,
      Self::List(_) => FieldKind::List,
      Self::Flag(_) => FieldKind::Flag,
    }
  }

  /// The numeric magnitude of a value, for tolerance and severity checks.
  pub fn as_number(&self) -> Option<f64> {
    match self {
      Self::Number(n) => Some(*n),
      Self::Money(m) => Some(m.amount),
      _ => None,
    }
  }

  /// True for values that carry no information (blank text, empty lists).
  /// Sources returning these are treated as having no data.
  pub fn is_blank(&self) -> bool {
    match self {
      Self::Text(s) | Self::Category(s) => s.trim().is_empty(),
      Self::List(items) => items.iter().all(|i| i.trim().is_empty()),
      Self::Number(n) => !n.is_finite(),
      Self::Money(m) => !m.amount.is_finite() || m.currency.trim().is_empty(),
      Self::Flag(_) => false,
    }
  }
}

/// The current state of one field of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
  pub value:              FieldData,
  pub source_tier:        SourceTier,
  pub confidence:         Confidence,
  /// Set by the store on every successful write; untouched by no-op refreshes.
  pub last_updated:       DateTime<Utc>,
  /// While `true`, automated resolution can never replace `value`.
  pub manually_corrected: bool,
  pub correction_reason:  Option<String>,
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// The shape of a tracked field's value.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldKind {
  Text,
  Number,
  Money,
  Category,
  List,
  Flag,
}

/// How much a change to a field matters.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
  Low,
  Medium,
  High,
}

impl Severity {
  /// One level up, saturating at `High`.
  pub fn escalate(self) -> Self {
    match self {
      Self::Low => Self::Medium,
      Self::Medium | Self::High => Self::High,
    }
  }
}

fn default_importance() -> Severity { Severity::Medium }
fn default_max_age_days() -> f64 { 90.0 }
fn default_major_change_ratio() -> f64 { 0.25 }

/// Per-field configuration: comparison, weighting, aging, and importance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
  pub name:               String,
  pub kind:               FieldKind,
  /// Required fields count double towards freshness and completeness.
  #[serde(default)]
  pub required:           bool,
  /// Base severity of a change to this field.
  #[serde(default = "default_importance")]
  pub importance:         Severity,
  /// Age at which the field's freshness reaches zero.
  #[serde(default = "default_max_age_days")]
  pub max_age_days:       f64,
  /// Relative tolerance for numeric equality; `0.01` means within 1%.
  #[serde(default)]
  pub tolerance:          f64,
  /// Relative numeric change at or above which severity is escalated.
  #[serde(default = "default_major_change_ratio")]
  pub major_change_ratio: f64,
}

impl FieldSpec {
  pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
    Self {
      name: name.into(),
      kind,
      required: false,
      importance: default_importance(),
      max_age_days: default_max_age_days(),
      tolerance: 0.0,
      major_change_ratio: default_major_change_ratio(),
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }

  pub fn importance(mut self, importance: Severity) -> Self {
    self.importance = importance;
    self
  }

  pub fn max_age_days(mut self, days: f64) -> Self {
    self.max_age_days = days;
    self
  }

  pub fn tolerance(mut self, tolerance: f64) -> Self {
    self.tolerance = tolerance;
    self
  }

  /// Reject values whose kind does not match this field.
  pub fn check_kind(&self, value: &FieldData) -> Result<()> {
    if value.kind() == self.kind {
      Ok(())
    } else {
      Err(Error::KindMismatch {
        field:    self.name.clone(),
        expected: self.kind,
        found:    value.kind(),
      })
    }
  }

  /// Field-appropriate equality: numeric tolerance for numbers and money,
  /// exact match for everything else.
  pub fn values_equal(&self, a: &FieldData, b: &FieldData) -> bool {
    match (a, b) {
      (FieldData::Number(x), FieldData::Number(y)) => {
        within_tolerance(*x, *y, self.tolerance)
      }
      (FieldData::Money(x), FieldData::Money(y)) => {
        x.currency.eq_ignore_ascii_case(&y.currency)
          && within_tolerance(x.amount, y.amount, self.tolerance)
      }
      _ => a == b,
    }
  }
}

fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
  if a == b {
    return true;
  }
  let scale = a.abs().max(b.abs());
  (a - b).abs() <= tolerance.max(0.0) * scale
}

/// The set of fields tracked for every entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<FieldSpec>", into = "Vec<FieldSpec>")]
pub struct FieldCatalog {
  fields: Vec<FieldSpec>,
}

impl FieldCatalog {
  /// Build a catalog, rejecting empty or duplicate field names.
  pub fn new(fields: Vec<FieldSpec>) -> Result<Self> {
    let mut seen = std::collections::HashSet::new();
    for spec in &fields {
      if spec.name.trim().is_empty() {
        return Err(Error::InvalidCatalog("field with empty name".into()));
      }
      if !seen.insert(spec.name.as_str()) {
        return Err(Error::InvalidCatalog(format!(
          "duplicate field {:?}",
          spec.name
        )));
      }
      if spec.max_age_days <= 0.0 {
        return Err(Error::InvalidCatalog(format!(
          "field {:?} has non-positive max_age_days",
          spec.name
        )));
      }
    }
    Ok(Self { fields })
  }

  pub fn get(&self, name: &str) -> Option<&FieldSpec> {
    self.fields.iter().find(|f| f.name == name)
  }

  /// Look up a field, failing with [`Error::UnknownField`].
  pub fn require(&self, name: &str) -> Result<&FieldSpec> {
    self
      .get(name)
      .ok_or_else(|| Error::UnknownField(name.to_owned()))
  }

  pub fn iter(&self) -> impl Iterator<Item = &FieldSpec> { self.fields.iter() }

  pub fn len(&self) -> usize { self.fields.len() }

  pub fn is_empty(&self) -> bool { self.fields.is_empty() }
}

impl TryFrom<Vec<FieldSpec>> for FieldCatalog {
  type Error = Error;

  fn try_from(fields: Vec<FieldSpec>) -> Result<Self> { Self::new(fields) }
}

impl From<FieldCatalog> for Vec<FieldSpec> {
  fn from(catalog: FieldCatalog) -> Self { catalog.fields }
}

impl Default for FieldCatalog {
  /// The stock competitive-intelligence catalog. Pricing, threat-level, and
  /// leadership fields are `High`; descriptive copy is `Low`.
  fn default() -> Self {
    use FieldKind::*;
    use Severity::*;

    let fields = vec![
      FieldSpec::new("pricing_model", Category)
        .required()
        .importance(High)
        .max_age_days(30.0),
      FieldSpec::new("threat_level", Category)
        .required()
        .importance(High)
        .max_age_days(30.0),
      FieldSpec::new("ceo", Text)
        .required()
        .importance(High)
        .max_age_days(90.0),
      FieldSpec::new("leadership_team", List)
        .importance(High)
        .max_age_days(90.0),
      FieldSpec::new("revenue", Money)
        .required()
        .max_age_days(30.0)
        .tolerance(0.01),
      FieldSpec::new("funding_total", Money)
        .max_age_days(60.0)
        .tolerance(0.01),
      FieldSpec::new("employee_count", Number)
        .required()
        .max_age_days(60.0)
        .tolerance(0.02),
      FieldSpec::new("headquarters", Text).max_age_days(180.0),
      FieldSpec::new("product_lines", List).max_age_days(60.0),
      FieldSpec::new("target_market", Text).max_age_days(90.0),
      FieldSpec::new("website", Text).required().max_age_days(180.0),
      FieldSpec::new("tagline", Text)
        .importance(Low)
        .max_age_days(180.0),
      FieldSpec::new("description", Text)
        .importance(Low)
        .max_age_days(180.0),
    ];

    Self { fields }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn money(amount: f64, currency: &str) -> FieldData {
    FieldData::Money(MoneyValue { amount, currency: currency.into() })
  }

  #[test]
  fn numeric_equality_respects_tolerance() {
    let spec = FieldSpec::new("revenue", FieldKind::Money).tolerance(0.01);
    assert!(spec.values_equal(&money(100.0, "USD"), &money(100.5, "usd")));
    assert!(!spec.values_equal(&money(100.0, "USD"), &money(102.0, "USD")));
    assert!(!spec.values_equal(&money(100.0, "USD"), &money(100.0, "EUR")));
  }

  #[test]
  fn text_equality_is_exact() {
    let spec = FieldSpec::new("ceo", FieldKind::Text);
    let a = FieldData::Text("Ada Lovelace".into());
    let b = FieldData::Text("ada lovelace".into());
    assert!(spec.values_equal(&a, &a.clone()));
    assert!(!spec.values_equal(&a, &b));
  }

  #[test]
  fn mismatched_kinds_are_never_equal() {
    let spec = FieldSpec::new("employee_count", FieldKind::Number);
    assert!(!spec.values_equal(
      &FieldData::Number(10.0),
      &FieldData::Text("10".into())
    ));
  }

  #[test]
  fn catalog_rejects_duplicates() {
    let err = FieldCatalog::new(vec![
      FieldSpec::new("ceo", FieldKind::Text),
      FieldSpec::new("ceo", FieldKind::Text),
    ])
    .unwrap_err();
    assert!(matches!(err, Error::InvalidCatalog(_)));
  }

  #[test]
  fn default_catalog_marks_pricing_high() {
    let catalog = FieldCatalog::default();
    let pricing = catalog.get("pricing_model").unwrap();
    assert_eq!(pricing.importance, Severity::High);
    assert!(pricing.required);
    assert_eq!(catalog.get("tagline").unwrap().importance, Severity::Low);
  }

  #[test]
  fn catalog_deserializes_from_a_list() {
    let json = r#"[{"name":"ceo","kind":"text","required":true}]"#;
    let catalog: FieldCatalog = serde_json::from_str(json).unwrap();
    let ceo = catalog.get("ceo").unwrap();
    assert!(ceo.required);
    assert_eq!(ceo.importance, Severity::Medium);
    assert_eq!(ceo.max_age_days, 90.0);
  }

  #[test]
  fn confidence_is_clamped() {
    assert_eq!(Confidence::new(250).get(), 100);
    let c: Confidence = serde_json::from_str("120").unwrap();
    assert_eq!(c, Confidence::MAX);
  }

  #[test]
  fn tier_round_trips_through_strings() {
    assert_eq!(SourceTier::KnownFallback.as_ref(), "known_fallback");
    assert_eq!("live".parse::<SourceTier>().unwrap(), SourceTier::Live);
  }
}
