//! Engine and source configuration.
//!
//! Every field has a serde default so a partial `[engine]` or `[sources]`
//! table in the server's config file is enough.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use vantage_core::field::{Confidence, SourceTier};

fn default_max_concurrency() -> usize { 4 }
fn default_field_parallelism() -> usize { 4 }
fn default_source_timeout_ms() -> u64 { 10_000 }
fn default_recent_changes_cap() -> usize { 50 }
fn default_summarizer_timeout_ms() -> u64 { 15_000 }

/// Tunables for refresh sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
  /// Entities processed in parallel within one session.
  #[serde(default = "default_max_concurrency")]
  pub max_concurrency:       usize,
  /// Field resolutions in flight within one entity.
  #[serde(default = "default_field_parallelism")]
  pub field_parallelism:     usize,
  /// Independent timeout for every source call.
  #[serde(default = "default_source_timeout_ms")]
  pub source_timeout_ms:     u64,
  /// Length of the rolling `recent_changes` window on progress snapshots.
  #[serde(default = "default_recent_changes_cap")]
  pub recent_changes_cap:    usize,
  #[serde(default = "default_summarizer_timeout_ms")]
  pub summarizer_timeout_ms: u64,
  #[serde(default)]
  pub confidence:            TierConfidence,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_concurrency:       default_max_concurrency(),
      field_parallelism:     default_field_parallelism(),
      source_timeout_ms:     default_source_timeout_ms(),
      recent_changes_cap:    default_recent_changes_cap(),
      summarizer_timeout_ms: default_summarizer_timeout_ms(),
      confidence:            TierConfidence::default(),
    }
  }
}

impl EngineConfig {
  pub fn source_timeout(&self) -> Duration {
    Duration::from_millis(self.source_timeout_ms)
  }

  pub fn summarizer_timeout(&self) -> Duration {
    Duration::from_millis(self.summarizer_timeout_ms)
  }
}

fn default_live() -> u8 { 90 }
fn default_secondary() -> u8 { 70 }
fn default_known_fallback() -> u8 { 40 }

/// Confidence attached to values resolved from each tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierConfidence {
  #[serde(default = "default_live")]
  pub live:           u8,
  #[serde(default = "default_secondary")]
  pub secondary:      u8,
  #[serde(default = "default_known_fallback")]
  pub known_fallback: u8,
}

impl Default for TierConfidence {
  fn default() -> Self {
    Self {
      live:           default_live(),
      secondary:      default_secondary(),
      known_fallback: default_known_fallback(),
    }
  }
}

impl TierConfidence {
  pub fn for_tier(&self, tier: SourceTier) -> Confidence {
    match tier {
      SourceTier::Live => Confidence::new(self.live),
      SourceTier::Secondary => Confidence::new(self.secondary),
      SourceTier::KnownFallback => Confidence::new(self.known_fallback),
      SourceTier::Manual => Confidence::MAX,
    }
  }
}

/// An HTTP endpoint serving `GET {base_url}/{slug}/{field}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSourceConfig {
  pub base_url: String,
  /// Sent as a bearer token when present.
  #[serde(default)]
  pub api_key:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummarizerConfig {
  /// Receives a `POST` of the session's change list.
  pub endpoint: String,
  #[serde(default)]
  pub api_key:  Option<String>,
}

/// Which concrete source backs each tier. Unconfigured tiers are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcesConfig {
  #[serde(default)]
  pub live:           Option<HttpSourceConfig>,
  #[serde(default)]
  pub secondary:      Option<HttpSourceConfig>,
  /// Path to a JSON dataset of `{slug: {field: value}}`.
  #[serde(default)]
  pub known_fallback: Option<PathBuf>,
  #[serde(default)]
  pub summarizer:     Option<SummarizerConfig>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_table_uses_defaults() {
    let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg, EngineConfig::default());
    assert_eq!(cfg.confidence.for_tier(SourceTier::Secondary).get(), 70);
  }

  #[test]
  fn partial_confidence_override() {
    let cfg: EngineConfig =
      serde_json::from_str(r#"{"max_concurrency": 2, "confidence": {"live": 95}}"#)
        .unwrap();
    assert_eq!(cfg.max_concurrency, 2);
    assert_eq!(cfg.confidence.live, 95);
    assert_eq!(cfg.confidence.known_fallback, 40);
  }
}
