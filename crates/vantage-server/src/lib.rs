//! HTTP server for the Vantage engine.
//!
//! Loads [`ServerConfig`], and mounts the JSON API under `/api` with request
//! tracing. The binary in `main.rs` wires the store, sources and engine
//! together.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use axum::Router;
use config::{ConfigError, Environment, File};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use vantage_core::{field::FieldCatalog, quality::QualityConfig, store::FieldStore};
use vantage_engine::{
  Engine,
  config::{EngineConfig, SourcesConfig},
};

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".into() }
fn default_port() -> u16 { 8600 }
fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/vantage/vantage.db") }

/// Runtime server configuration, deserialised from `vantage.toml` and
/// `VANTAGE_*` environment variables (nested keys joined with `__`, e.g.
/// `VANTAGE_ENGINE__MAX_CONCURRENCY=8`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  /// A leading `~` is expanded with [`expand_tilde`].
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
  #[serde(default)]
  pub engine:     EngineConfig,
  #[serde(default)]
  pub sources:    SourcesConfig,
  /// Replaces the built-in field catalog when present.
  #[serde(default)]
  pub catalog:    Option<FieldCatalog>,
  #[serde(default)]
  pub quality:    QualityConfig,
  #[serde(default)]
  pub schedule:   ScheduleConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
  /// Seconds between scheduled refreshes of every enabled entity. Unset or
  /// zero disables the interval trigger.
  #[serde(default)]
  pub interval_secs: Option<u64>,
}

impl ScheduleConfig {
  pub fn interval(&self) -> Option<Duration> {
    self
      .interval_secs
      .filter(|&secs| secs > 0)
      .map(Duration::from_secs)
  }
}

/// Read `path` (optional) layered under the environment.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
  from_file_source(File::from(path).required(false))
}

fn from_file_source<F>(file: F) -> Result<ServerConfig, ConfigError>
where
  F: config::Source + Send + Sync + 'static,
{
  config::Config::builder()
    .add_source(file)
    .add_source(
      Environment::with_prefix("VANTAGE")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()?
    .try_deserialize()
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The complete application: the API under `/api`, traced.
pub fn app<S>(engine: Engine<S>) -> Router
where
  S: FieldStore + 'static,
{
  Router::new()
    .nest("/api", vantage_api::api_router(engine))
    .layer(TraceLayer::new_for_http())
}
