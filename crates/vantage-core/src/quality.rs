//! Freshness, completeness, and overall quality scores.
//!
//! Scores are a pure function of an [`EntityView`], the [`FieldCatalog`], and
//! the current time. Nothing here mutates the store.
//!
//! Overall quality is a fixed blend:
//!
//! ```text
//! quality = freshness_weight * freshness + (1 - freshness_weight) * completeness
//! ```
//!
//! With the default weight of `0.5` this is the simple average of the two.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  entity::{EntityView, Verification},
  field::{FieldCatalog, FieldSpec, FieldValue},
};

/// The score every freshly written field starts at.
pub const CEILING: f64 = 100.0;

const SECONDS_PER_DAY: f64 = 86_400.0;

fn default_freshness_weight() -> f64 { 0.5 }
fn default_required_weight() -> f64 { 2.0 }
fn default_optional_weight() -> f64 { 1.0 }
fn default_stale_threshold() -> f64 { 50.0 }
fn default_healthy_threshold() -> f64 { 60.0 }

/// Tunables for [`score`] and [`stale_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityConfig {
  /// Share of `quality` contributed by freshness; the rest is completeness.
  #[serde(default = "default_freshness_weight")]
  pub freshness_weight:  f64,
  #[serde(default = "default_required_weight")]
  pub required_weight:   f64,
  #[serde(default = "default_optional_weight")]
  pub optional_weight:   f64,
  /// Fields whose freshness falls below this are reported as stale.
  #[serde(default = "default_stale_threshold")]
  pub stale_threshold:   f64,
  /// Minimum `quality` for an entity to be considered healthy.
  #[serde(default = "default_healthy_threshold")]
  pub healthy_threshold: f64,
}

impl Default for QualityConfig {
  fn default() -> Self {
    Self {
      freshness_weight:  default_freshness_weight(),
      required_weight:   default_required_weight(),
      optional_weight:   default_optional_weight(),
      stale_threshold:   default_stale_threshold(),
      healthy_threshold: default_healthy_threshold(),
    }
  }
}

impl QualityConfig {
  fn weight(&self, spec: &FieldSpec) -> f64 {
    if spec.required {
      self.required_weight
    } else {
      self.optional_weight
    }
  }
}

/// The derived quality of one entity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
  pub entity_id:             Uuid,
  /// Weighted average freshness of populated fields, 0–100.
  pub freshness:             f64,
  /// Weighted share of catalog fields holding a value, 0–100.
  pub completeness:          f64,
  pub required_completeness: f64,
  pub optional_completeness: f64,
  pub quality:               f64,
  /// Every required field is populated and `quality` clears the threshold.
  pub healthy:               bool,
  /// Last explicit human verification; independent of scrape timestamps.
  pub last_verified:         Option<Verification>,
  pub computed_at:           DateTime<Utc>,
}

/// A field whose freshness has dropped below the stale threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleField {
  pub entity_id:         Uuid,
  pub entity_name:       String,
  pub field:             String,
  pub freshness:         f64,
  pub days_since_update: f64,
}

/// Fractional days since `value` was last written; never negative.
pub fn days_since_update(value: &FieldValue, now: DateTime<Utc>) -> f64 {
  let secs = (now - value.last_updated).num_seconds().max(0) as f64;
  secs / SECONDS_PER_DAY
}

/// `max(0, 100 - 100 * days / max_age_days)`.
pub fn field_freshness(spec: &FieldSpec, value: &FieldValue, now: DateTime<Utc>) -> f64 {
  let max_age = spec.max_age_days.max(f64::EPSILON);
  (CEILING - CEILING * days_since_update(value, now) / max_age).max(0.0)
}

fn percent(part: f64, whole: f64) -> f64 {
  if whole <= 0.0 { CEILING } else { CEILING * part / whole }
}

/// Score an entity against the catalog.
pub fn score(
  view: &EntityView,
  catalog: &FieldCatalog,
  config: &QualityConfig,
  now: DateTime<Utc>,
) -> QualityScore {
  let mut fresh_sum = 0.0;
  let mut fresh_weight = 0.0;
  let mut present_weight = 0.0;
  let mut total_weight = 0.0;
  let (mut req_present, mut req_total) = (0usize, 0usize);
  let (mut opt_present, mut opt_total) = (0usize, 0usize);

  for spec in catalog.iter() {
    let weight = config.weight(spec);
    total_weight += weight;
    if spec.required {
      req_total += 1;
    } else {
      opt_total += 1;
    }

    let Some(value) = view.field(&spec.name) else { continue };
    present_weight += weight;
    fresh_weight += weight;
    fresh_sum += weight * field_freshness(spec, value, now);
    if spec.required {
      req_present += 1;
    } else {
      opt_present += 1;
    }
  }

  let freshness = if fresh_weight > 0.0 { fresh_sum / fresh_weight } else { 0.0 };
  let completeness = percent(present_weight, total_weight);
  let required_completeness = percent(req_present as f64, req_total as f64);
  let optional_completeness = percent(opt_present as f64, opt_total as f64);

  let w = config.freshness_weight.clamp(0.0, 1.0);
  let quality = w * freshness + (1.0 - w) * completeness;

  QualityScore {
    entity_id: view.entity.entity_id,
    freshness,
    completeness,
    required_completeness,
    optional_completeness,
    quality,
    healthy: req_present == req_total && quality >= config.healthy_threshold,
    last_verified: view.last_verified.clone(),
    computed_at: now,
  }
}

/// Every populated catalog field of `view` whose freshness is below
/// `threshold`, most stale first.
pub fn stale_fields(
  view: &EntityView,
  catalog: &FieldCatalog,
  threshold: f64,
  now: DateTime<Utc>,
) -> Vec<StaleField> {
  let mut stale: Vec<StaleField> = catalog
    .iter()
    .filter_map(|spec| {
      let value = view.field(&spec.name)?;
      let freshness = field_freshness(spec, value, now);
      (freshness < threshold).then(|| StaleField {
        entity_id: view.entity.entity_id,
        entity_name: view.entity.display_name.clone(),
        field: spec.name.clone(),
        freshness,
        days_since_update: days_since_update(value, now),
      })
    })
    .collect();
  sort_most_stale_first(&mut stale);
  stale
}

/// Lowest freshness first; ties broken by age, then by name for determinism.
pub fn sort_most_stale_first(stale: &mut [StaleField]) {
  stale.sort_by(|a, b| {
    a.freshness
      .total_cmp(&b.freshness)
      .then(b.days_since_update.total_cmp(&a.days_since_update))
      .then_with(|| a.entity_name.cmp(&b.entity_name))
      .then_with(|| a.field.cmp(&b.field))
  });
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use chrono::{Duration, TimeZone};

  use super::*;
  use crate::{
    entity::Entity,
    field::{Confidence, FieldData, FieldKind, SourceTier},
  };

  fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() }

  fn value_aged(days: i64) -> FieldValue {
    FieldValue {
      value:              FieldData::Text("x".into()),
      source_tier:        SourceTier::Live,
      confidence:         Confidence::new(90),
      last_updated:       now() - Duration::days(days),
      manually_corrected: false,
      correction_reason:  None,
    }
  }

  fn catalog() -> FieldCatalog {
    FieldCatalog::new(vec![
      FieldSpec::new("ceo", FieldKind::Text).required().max_age_days(100.0),
      FieldSpec::new("tagline", FieldKind::Text).max_age_days(10.0),
    ])
    .unwrap()
  }

  fn view(fields: Vec<(&str, FieldValue)>) -> EntityView {
    EntityView {
      entity:        Entity {
        entity_id:    Uuid::nil(),
        slug:         "acme".into(),
        display_name: "Acme".into(),
        enabled:      true,
        created_at:   now(),
      },
      fields:        fields
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect::<BTreeMap<_, _>>(),
      last_verified: None,
    }
  }

  #[test]
  fn freshness_decays_linearly_and_floors_at_zero() {
    let spec = FieldSpec::new("ceo", FieldKind::Text).max_age_days(100.0);
    assert_eq!(field_freshness(&spec, &value_aged(0), now()), 100.0);
    assert_eq!(field_freshness(&spec, &value_aged(25), now()), 75.0);
    assert_eq!(field_freshness(&spec, &value_aged(400), now()), 0.0);
  }

  #[test]
  fn freshness_never_increases_with_time() {
    let spec = FieldSpec::new("ceo", FieldKind::Text).max_age_days(30.0);
    let mut last = f64::MAX;
    for days in 0..60 {
      let f = field_freshness(&spec, &value_aged(days), now());
      assert!(f <= last, "day {days}: {f} > {last}");
      last = f;
    }
  }

  #[test]
  fn complete_fresh_entity_scores_full_marks() {
    let v = view(vec![("ceo", value_aged(0)), ("tagline", value_aged(0))]);
    let s = score(&v, &catalog(), &QualityConfig::default(), now());
    assert_eq!(s.freshness, 100.0);
    assert_eq!(s.completeness, 100.0);
    assert_eq!(s.quality, 100.0);
    assert!(s.healthy);
  }

  #[test]
  fn missing_required_field_is_unhealthy() {
    let v = view(vec![("tagline", value_aged(0))]);
    let s = score(&v, &catalog(), &QualityConfig::default(), now());
    assert_eq!(s.required_completeness, 0.0);
    assert_eq!(s.optional_completeness, 100.0);
    // Required weighs 2, optional 1: 1/3 complete.
    assert!((s.completeness - 100.0 / 3.0).abs() < 1e-9);
    assert!(!s.healthy);
  }

  #[test]
  fn required_fields_weigh_more_in_freshness() {
    // ceo: 50 fresh (weight 2); tagline: 0 fresh (weight 1).
    let v = view(vec![("ceo", value_aged(50)), ("tagline", value_aged(20))]);
    let s = score(&v, &catalog(), &QualityConfig::default(), now());
    assert!((s.freshness - 100.0 / 3.0).abs() < 1e-9);
  }

  #[test]
  fn stale_fields_are_sorted_most_stale_first() {
    let v = view(vec![("ceo", value_aged(60)), ("tagline", value_aged(9))]);
    let stale = stale_fields(&v, &catalog(), 50.0, now());
    let names: Vec<_> = stale.iter().map(|s| s.field.as_str()).collect();
    assert_eq!(names, ["tagline", "ceo"]);
    assert!(stale[0].freshness < stale[1].freshness);
  }

  #[test]
  fn fresh_fields_are_not_stale() {
    let v = view(vec![("ceo", value_aged(1))]);
    assert!(stale_fields(&v, &catalog(), 50.0, now()).is_empty());
  }
}
