//! vantage-server binary.
//!
//! Reads `vantage.toml` (or the path given with `--config`) under `VANTAGE_*`
//! environment overrides, opens the SQLite field store, builds the configured
//! sources, and serves the JSON API over HTTP.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vantage_engine::{
  Engine,
  resolver::SourceResolver,
  scheduler::spawn_interval_trigger,
  summarize::{HttpSummarizer, StaticSummarizer, Summarizer},
};
use vantage_server::{expand_tilde, load_config};
use vantage_store_sqlite::SqliteStore;

#[derive(Parser)]
#[command(author, version, about = "Vantage data collection server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vantage.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = load_config(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let resolver = SourceResolver::from_config(&server_cfg.sources, &server_cfg.engine)
    .await
    .context("failed to build sources")?;
  tracing::info!(tiers = ?resolver.tiers(), "sources ready");

  let summarizer: Arc<dyn Summarizer> = match &server_cfg.sources.summarizer {
    Some(cfg) => Arc::new(HttpSummarizer::new(reqwest::Client::new(), cfg)),
    None => Arc::new(StaticSummarizer),
  };

  let mut builder = Engine::builder(Arc::new(store))
    .resolver(resolver)
    .summarizer(summarizer)
    .quality(server_cfg.quality.clone())
    .config(server_cfg.engine.clone());
  if let Some(catalog) = server_cfg.catalog.clone() {
    builder = builder.catalog(catalog);
  }
  let engine = builder.start();

  if let Some(every) = server_cfg.schedule.interval() {
    spawn_interval_trigger(engine.sessions().clone(), every);
  }

  let app = vantage_server::app(engine);
  let address = format!("{}:{}", server_cfg.host, server_cfg.port);

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
