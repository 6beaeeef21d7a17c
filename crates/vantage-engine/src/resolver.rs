//! Tiered source resolution.
//!
//! Tiers are consulted in the fixed order Live → Secondary → KnownFallback.
//! Resolution stops at the first tier that yields a non-empty value of the
//! right kind. Tier errors and timeouts are logged and treated as empty; only
//! exhausting every tier yields [`Resolution::NoData`].

use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use vantage_core::{
  entity::Entity,
  field::{Confidence, FieldData, FieldSpec, SourceTier},
};

use crate::{
  Error, Result,
  config::{EngineConfig, SourcesConfig},
  source::{HttpSource, Source, SourceError, SourceErrorKind, StaticDataset},
};

struct Tier {
  tier:       SourceTier,
  source:     Arc<dyn Source>,
  confidence: Confidence,
}

/// One tier's failure during a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFailure {
  pub tier:    SourceTier,
  pub kind:    SourceErrorKind,
  pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
  Found {
    value:      FieldData,
    tier:       SourceTier,
    confidence: Confidence,
  },
  NoData {
    /// Tiers that errored, in the order consulted.
    failures: Vec<TierFailure>,
    /// How many tiers were consulted.
    consulted: usize,
  },
}

impl Resolution {
  /// True when there was no data because every consulted tier failed, as
  /// opposed to every tier answering "nothing".
  pub fn all_tiers_failed(&self) -> bool {
    match self {
      Self::NoData { failures, consulted } => *consulted > 0 && failures.len() == *consulted,
      Self::Found { .. } => false,
    }
  }
}

pub struct SourceResolver {
  tiers:   Vec<Tier>,
  timeout: Duration,
}

impl SourceResolver {
  pub fn new(timeout: Duration) -> Self { Self { tiers: Vec::new(), timeout } }

  /// Install `source` for `tier`, replacing any previous one. The `Manual`
  /// tier cannot be backed by a source.
  pub fn with_tier(
    mut self,
    tier: SourceTier,
    source: Arc<dyn Source>,
    confidence: Confidence,
  ) -> Result<Self> {
    if !tier.is_automated() {
      return Err(Error::Config("the manual tier cannot have a source".into()));
    }
    self.tiers.retain(|t| t.tier != tier);
    self.tiers.push(Tier { tier, source, confidence });
    self.tiers.sort_by_key(|t| tier_rank(t.tier));
    Ok(self)
  }

  /// Build the configured sources. Tiers without configuration are skipped.
  pub async fn from_config(sources: &SourcesConfig, engine: &EngineConfig) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("vantage/", env!("CARGO_PKG_VERSION")))
      .build()?;
    let confidence = &engine.confidence;

    let mut resolver = Self::new(engine.source_timeout());
    if let Some(cfg) = &sources.live {
      let source = HttpSource::new("live", client.clone(), cfg);
      resolver = resolver.with_tier(
        SourceTier::Live,
        Arc::new(source),
        confidence.for_tier(SourceTier::Live),
      )?;
    }
    if let Some(cfg) = &sources.secondary {
      let source = HttpSource::new("secondary", client.clone(), cfg);
      resolver = resolver.with_tier(
        SourceTier::Secondary,
        Arc::new(source),
        confidence.for_tier(SourceTier::Secondary),
      )?;
    }
    if let Some(path) = &sources.known_fallback {
      let source = StaticDataset::load(path).await?;
      resolver = resolver.with_tier(
        SourceTier::KnownFallback,
        Arc::new(source),
        confidence.for_tier(SourceTier::KnownFallback),
      )?;
    }

    if resolver.tiers.is_empty() {
      tracing::warn!("no sources configured; refreshes will resolve nothing");
    }
    Ok(resolver)
  }

  /// The tiers that have a source, in consultation order.
  pub fn tiers(&self) -> Vec<SourceTier> { self.tiers.iter().map(|t| t.tier).collect() }

  pub async fn resolve(&self, entity: &Entity, field: &FieldSpec) -> Resolution {
    let mut failures = Vec::new();

    for tier in &self.tiers {
      let outcome = tokio::time::timeout(self.timeout, tier.source.fetch(entity, field))
        .await
        .unwrap_or_else(|_| {
          Err(SourceError::new(
            SourceErrorKind::Timeout,
            format!("no answer within {:?}", self.timeout),
          ))
        })
        .and_then(|value| match value {
          Some(v) if field.check_kind(&v).is_err() => Err(SourceError::parse(format!(
            "{} returned {} for a {} field",
            tier.source.name(),
            v.kind(),
            field.kind
          ))),
          Some(v) if v.is_blank() => Ok(None),
          other => Ok(other),
        });

      match outcome {
        Ok(Some(value)) => {
          tracing::debug!(
            entity = %entity.slug,
            field = %field.name,
            tier = %tier.tier,
            "resolved"
          );
          return Resolution::Found { value, tier: tier.tier, confidence: tier.confidence };
        }
        Ok(None) => {}
        Err(e) => {
          tracing::warn!(
            entity = %entity.slug,
            field = %field.name,
            tier = %tier.tier,
            source = tier.source.name(),
            kind = %e.kind,
            "source failed: {}",
            e.message
          );
          failures.push(TierFailure { tier: tier.tier, kind: e.kind, message: e.message });
        }
      }
    }

    Resolution::NoData { failures, consulted: self.tiers.len() }
  }
}

fn tier_rank(tier: SourceTier) -> usize {
  SourceTier::AUTOMATED
    .iter()
    .position(|t| *t == tier)
    .unwrap_or(SourceTier::AUTOMATED.len())
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use vantage_core::field::FieldCatalog;

  use super::*;
  use crate::testing::{Scripted, entity};

  fn ceo() -> FieldSpec { FieldCatalog::default().require("ceo").unwrap().clone() }

  fn text(s: &str) -> FieldData { FieldData::Text(s.into()) }

  fn resolver(tiers: Vec<(SourceTier, Arc<Scripted>)>) -> SourceResolver {
    tiers
      .into_iter()
      .fold(SourceResolver::new(Duration::from_millis(200)), |r, (tier, src)| {
        r.with_tier(tier, src, EngineConfig::default().confidence.for_tier(tier))
          .unwrap()
      })
  }

  #[tokio::test]
  async fn first_tier_with_a_value_wins() {
    let live = Scripted::value(text("Ada"));
    let secondary = Scripted::value(text("Grace"));
    let r = resolver(vec![
      (SourceTier::Secondary, secondary.clone()),
      (SourceTier::Live, live.clone()),
    ]);

    let res = r.resolve(&entity("acme"), &ceo()).await;
    assert_eq!(
      res,
      Resolution::Found {
        value:      text("Ada"),
        tier:       SourceTier::Live,
        confidence: Confidence::new(90),
      }
    );
    assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn errors_fall_through_to_the_next_tier() {
    let r = resolver(vec![
      (SourceTier::Live, Scripted::failing(SourceErrorKind::Unreachable)),
      (SourceTier::Secondary, Scripted::empty()),
      (SourceTier::KnownFallback, Scripted::value(text("Ada"))),
    ]);

    let res = r.resolve(&entity("acme"), &ceo()).await;
    assert!(matches!(
      res,
      Resolution::Found { tier: SourceTier::KnownFallback, confidence, .. }
        if confidence.get() == 40
    ));
  }

  #[tokio::test]
  async fn slow_source_times_out() {
    let slow = Arc::new(Scripted {
      answer: Ok(Some(text("late"))),
      delay:  Some(Duration::from_secs(5)),
      calls:  AtomicUsize::new(0),
    });
    let r = resolver(vec![
      (SourceTier::Live, slow),
      (SourceTier::Secondary, Scripted::value(text("on time"))),
    ]);

    let res = r.resolve(&entity("acme"), &ceo()).await;
    assert!(matches!(res, Resolution::Found { tier: SourceTier::Secondary, .. }));
  }

  #[tokio::test]
  async fn wrong_kind_is_a_parse_failure() {
    let r = resolver(vec![(SourceTier::Live, Scripted::value(FieldData::Flag(true)))]);
    let res = r.resolve(&entity("acme"), &ceo()).await;
    let Resolution::NoData { failures, .. } = &res else { panic!("{res:?}") };
    assert_eq!(failures[0].kind, SourceErrorKind::ParseError);
    assert!(res.all_tiers_failed());
  }

  #[tokio::test]
  async fn exhaustion_distinguishes_errors_from_silence() {
    let silent = resolver(vec![
      (SourceTier::Live, Scripted::empty()),
      (SourceTier::Secondary, Scripted::failing(SourceErrorKind::RateLimited)),
    ]);
    let res = silent.resolve(&entity("acme"), &ceo()).await;
    assert!(matches!(res, Resolution::NoData { consulted: 2, .. }));
    assert!(!res.all_tiers_failed());

    let failing = resolver(vec![
      (SourceTier::Live, Scripted::failing(SourceErrorKind::Timeout)),
      (SourceTier::Secondary, Scripted::failing(SourceErrorKind::RateLimited)),
      (SourceTier::KnownFallback, Scripted::failing(SourceErrorKind::ParseError)),
    ]);
    assert!(failing.resolve(&entity("acme"), &ceo()).await.all_tiers_failed());
  }

  #[test]
  fn manual_tier_cannot_have_a_source() {
    let r = SourceResolver::new(Duration::from_secs(1)).with_tier(
      SourceTier::Manual,
      Scripted::empty(),
      Confidence::MAX,
    );
    assert!(r.is_err());
  }
}
