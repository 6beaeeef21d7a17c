//! `vantage`, command-line client for the Vantage server.
//!
//! # Usage
//!
//! ```text
//! vantage --url http://localhost:8600 entities add acme "Acme Corp"
//! vantage refresh --wait
//! vantage correct <entity-id> pricing_model usage-based --user alice --reason "pricing page"
//! vantage stale --threshold 40
//! ```

mod client;
mod render;
mod value;

use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig, ForceRequest};
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vantage_core::{
  field::{Confidence, FieldData, SourceTier},
  session::{RefreshTarget, SessionStatus},
};

const DEFAULT_URL: &str = "http://localhost:8600";

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "vantage", about = "Command-line client for the Vantage server")]
struct Args {
  /// Path to a TOML config file (`url`, `user`).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the vantage server (default: http://localhost:8600).
  #[arg(long, env = "VANTAGE_URL")]
  url: Option<String>,

  /// Print raw JSON instead of text.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Manage tracked entities.
  #[command(subcommand)]
  Entities(EntityCommand),
  /// Start a refresh of every enabled entity, or only the given ones.
  Refresh {
    #[arg(long = "entity", value_name = "ID")]
    entities: Vec<Uuid>,
    /// Poll progress until the session finishes.
    #[arg(long)]
    wait:     bool,
  },
  /// Show a session's progress.
  Progress { session: Uuid },
  /// Stop dispatching a running session.
  Abort { session: Uuid },
  /// List recent sessions.
  Sessions {
    #[arg(long, default_value_t = 20)]
    limit: usize,
  },
  /// Every change a session committed.
  Changes { session: Uuid },
  /// Record a manual correction; the value is parsed according to the field.
  Correct {
    entity: Uuid,
    field:  String,
    value:  String,
    #[arg(long)]
    user:   Option<String>,
    #[arg(long)]
    reason: String,
  },
  /// Overwrite a field even if it was manually corrected.
  Force {
    entity:     Uuid,
    field:      String,
    value:      String,
    #[arg(long, value_parser = parse_tier)]
    tier:       SourceTier,
    #[arg(long)]
    confidence: Option<u8>,
    #[arg(long)]
    user:       Option<String>,
    #[arg(long)]
    reason:     String,
  },
  /// Show an entity's audit trail.
  Audit {
    entity: Uuid,
    #[arg(long)]
    since:  Option<DateTime<Utc>>,
  },
  /// Check the audit hash chain.
  VerifyAudit,
  /// Quality scores for the given entities, or every enabled one.
  Quality { entities: Vec<Uuid> },
  /// Fields whose freshness has fallen below the threshold.
  Stale {
    #[arg(long)]
    threshold: Option<f64>,
  },
  /// List the tracked fields.
  Catalog,
}

#[derive(Subcommand, Debug)]
enum EntityCommand {
  List {
    /// Include disabled entities.
    #[arg(long)]
    all: bool,
  },
  Add { slug: String, display_name: String },
  Show { id: Uuid },
  Enable { id: Uuid },
  Disable { id: Uuid },
  /// Stamp the entity as verified by a human.
  Verify {
    id:   Uuid,
    #[arg(long)]
    user: Option<String>,
  },
}

fn parse_tier(s: &str) -> Result<SourceTier, String> {
  s.parse()
    .map_err(|_| format!("unknown tier {s:?}; expected live, secondary or known_fallback"))
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:  String,
  /// Recorded as the acting user on corrections and verifications.
  #[serde(default)]
  user: String,
}

struct Ctx {
  client: ApiClient,
  user:   Option<String>,
  json:   bool,
}

impl Ctx {
  fn user(&self, flag: Option<String>) -> Result<String> {
    flag
      .or_else(|| self.user.clone())
      .ok_or_else(|| anyhow!("no user given; pass --user or set `user` in the config file"))
  }

  fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce(&T) -> String) -> Result<()> {
    if self.json {
      println!("{}", serde_json::to_string_pretty(value)?);
    } else {
      println!("{}", text(value));
    }
    Ok(())
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();

  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags override config file, which overrides defaults.
  let api_config = ApiConfig {
    base_url: args
      .url
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| DEFAULT_URL.to_string()),
  };
  tracing::debug!(url = %api_config.base_url, "using server");

  let ctx = Ctx {
    client: ApiClient::new(api_config)?,
    user:   (!file_cfg.user.is_empty()).then_some(file_cfg.user),
    json:   args.json,
  };
  run(&ctx, args.command).await
}

async fn run(ctx: &Ctx, command: Command) -> Result<()> {
  let client = &ctx.client;
  match command {
    Command::Entities(cmd) => entities(ctx, cmd).await,
    Command::Refresh { entities, wait } => {
      let target = if entities.is_empty() {
        RefreshTarget::All
      } else {
        RefreshTarget::Entities(entities.into_iter().collect())
      };
      let session_id = client.start_refresh(target).await?;
      println!("started session {session_id}");
      if wait { watch(ctx, session_id).await } else { Ok(()) }
    }
    Command::Progress { session } => {
      let progress = client.progress(session).await?;
      ctx.emit(&progress, render::progress_report)
    }
    Command::Abort { session } => {
      client.abort(session).await?;
      println!("abort requested for {session}; in-flight entities will finish");
      Ok(())
    }
    Command::Sessions { limit } => {
      let sessions = client.sessions(limit).await?;
      ctx.emit(&sessions, |s| s.iter().map(render::session_row).collect::<Vec<_>>().join("\n"))
    }
    Command::Changes { session } => {
      let changes = client.session_changes(session).await?;
      ctx.emit(&changes, |c| c.iter().map(render::change).collect::<Vec<_>>().join("\n"))
    }
    Command::Correct { entity, field, value, user, reason } => {
      let user = ctx.user(user)?;
      let value = typed_value(client, &field, &value).await?;
      let record = client.correct(entity, &field, value, &user, &reason).await?;
      ctx.emit(&record, render::change)
    }
    Command::Force { entity, field, value, tier, confidence, user, reason } => {
      let body = ForceRequest {
        value: typed_value(client, &field, &value).await?,
        source_tier: tier,
        confidence: confidence.map(Confidence::new),
        user_id: ctx.user(user)?,
        reason,
      };
      let record = client.force(entity, &field, &body).await?;
      ctx.emit(&record, render::change)
    }
    Command::Audit { entity, since } => {
      let trail = client.audit_trail(entity, since).await?;
      ctx.emit(&trail, |t| t.iter().map(render::change).collect::<Vec<_>>().join("\n"))
    }
    Command::VerifyAudit => {
      let verification = client.verify_audit().await?;
      ctx.emit(&verification, |v| match v.first_broken {
        None => format!("audit chain intact ({} entries)", v.entries),
        Some(seq) => format!("audit chain BROKEN at entry {seq} of {}", v.entries),
      })
    }
    Command::Quality { entities } => {
      let scores = client.quality(&entities).await?;
      ctx.emit(&scores, |s| render::quality_table(s))
    }
    Command::Stale { threshold } => {
      let stale = client.stale(threshold).await?;
      ctx.emit(&stale, |s| render::stale_table(s))
    }
    Command::Catalog => {
      let catalog = client.catalog().await?;
      ctx.emit(&catalog, |c| {
        c.iter()
          .map(|f| {
            let required = if f.required { ", required" } else { "" };
            format!("{:<18} {} ({}{required})", f.name, f.kind, f.importance)
          })
          .collect::<Vec<_>>()
          .join("\n")
      })
    }
  }
}

async fn entities(ctx: &Ctx, cmd: EntityCommand) -> Result<()> {
  let client = &ctx.client;
  match cmd {
    EntityCommand::List { all } => {
      let entities = client.entities(all).await?;
      ctx.emit(&entities, |list| {
        list
          .iter()
          .map(|e| {
            let state = if e.enabled { "" } else { "  (disabled)" };
            format!("{}  {:<20} {}{state}", e.entity_id, e.slug, e.display_name)
          })
          .collect::<Vec<_>>()
          .join("\n")
      })
    }
    EntityCommand::Add { slug, display_name } => {
      let entity = client.add_entity(&slug, &display_name).await?;
      ctx.emit(&entity, |e| format!("added {} ({})", e.slug, e.entity_id))
    }
    EntityCommand::Show { id } => {
      let view = client.entity(id).await?;
      ctx.emit(&view, |v| {
        let mut lines = vec![format!("{} ({})", v.entity.display_name, v.entity.slug)];
        if let Some(verified) = &v.last_verified {
          lines.push(format!(
            "verified {} by {}",
            verified.verified_at.format("%Y-%m-%d"),
            verified.verified_by
          ));
        }
        for (name, field) in &v.fields {
          let lock = if field.manually_corrected { " [manual]" } else { "" };
          lines.push(format!(
            "  {:<18} {}  ({}, {}%, {}){lock}",
            name,
            render::data(&field.value),
            field.source_tier,
            field.confidence.get(),
            field.last_updated.format("%Y-%m-%d"),
          ));
        }
        lines.join("\n")
      })
    }
    EntityCommand::Enable { id } => set_enabled(ctx, id, true).await,
    EntityCommand::Disable { id } => set_enabled(ctx, id, false).await,
    EntityCommand::Verify { id, user } => {
      let at = client.verify(id, &ctx.user(user)?).await?;
      println!("verified at {at}");
      Ok(())
    }
  }
}

async fn set_enabled(ctx: &Ctx, id: Uuid, enabled: bool) -> Result<()> {
  let entity = ctx.client.set_enabled(id, enabled).await?;
  let state = if entity.enabled { "enabled" } else { "disabled" };
  ctx.emit(&entity, |e| format!("{} {state}", e.slug))
}

/// Parse `raw` using the kind the server's catalog declares for `field`.
async fn typed_value(client: &ApiClient, field: &str, raw: &str) -> Result<FieldData> {
  let catalog = client.catalog().await?;
  let spec = catalog
    .get(field)
    .ok_or_else(|| anyhow!("field {field:?} is not in the server's catalog"))?;
  value::parse(spec.kind, raw).with_context(|| format!("invalid value for {field}"))
}

/// Poll until the session stops running, printing a line per change in state.
async fn watch(ctx: &Ctx, session_id: Uuid) -> Result<()> {
  let mut last = String::new();
  loop {
    let progress = ctx.client.progress(session_id).await?;
    if progress.status != SessionStatus::Running && progress.summary.is_some() {
      return ctx.emit(&progress, render::progress_report);
    }
    let line = render::progress_line(&progress);
    if line != last {
      eprintln!("{line}");
      last = line;
    }
    tokio::time::sleep(Duration::from_millis(500)).await;
  }
}
