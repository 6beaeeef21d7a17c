//! Async HTTP client wrapping the Vantage JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use uuid::Uuid;
use vantage_core::{
  audit::AuditVerification,
  change::ChangeRecord,
  entity::{Entity, EntityView},
  field::{Confidence, FieldCatalog, FieldData, SourceTier},
  quality::{QualityScore, StaleField},
  session::{RefreshSession, RefreshTarget, SessionProgress},
};

/// Connection settings for the Vantage API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
}

#[derive(Deserialize)]
struct Started {
  session_id: Uuid,
}

#[derive(Deserialize)]
struct Verified {
  verified_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct ErrorBody {
  error: String,
}

/// A forced overwrite, as sent to `/entities/:id/fields/:field/force`.
#[derive(Debug, Serialize)]
pub struct ForceRequest {
  pub value:       FieldData,
  pub source_tier: SourceTier,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub confidence:  Option<Confidence>,
  pub user_id:     String,
  pub reason:      String,
}

/// Async HTTP client for the Vantage JSON REST API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn request(&self, method: Method, path: &str) -> RequestBuilder {
    self.client.request(method, self.url(path))
  }

  /// Send `req` and decode a JSON body, turning API errors into readable
  /// messages.
  async fn send<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T> {
    let resp = self.checked(what, req).await?;
    resp.json().await.with_context(|| format!("deserialising {what} response"))
  }

  async fn checked(&self, what: &str, req: RequestBuilder) -> Result<Response> {
    let resp = req.send().await.with_context(|| format!("{what} failed"))?;
    let status = resp.status();
    if status.is_success() {
      return Ok(resp);
    }
    let message = match resp.json::<ErrorBody>().await {
      Ok(body) => body.error,
      Err(_) => status.canonical_reason().unwrap_or("unknown error").to_owned(),
    };
    Err(anyhow!("{what} → {status}: {message}"))
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// `POST /api/sessions`
  pub async fn start_refresh(&self, target: RefreshTarget) -> Result<Uuid> {
    let req = self
      .request(Method::POST, "/sessions")
      .json(&json!({ "target": target }));
    let started: Started = self.send("POST /sessions", req).await?;
    Ok(started.session_id)
  }

  /// `GET /api/sessions/:id/progress`
  pub async fn progress(&self, session_id: Uuid) -> Result<SessionProgress> {
    let path = format!("/sessions/{session_id}/progress");
    self
      .send(&format!("GET {path}"), self.request(Method::GET, &path))
      .await
  }

  /// `POST /api/sessions/:id/abort`
  pub async fn abort(&self, session_id: Uuid) -> Result<()> {
    let path = format!("/sessions/{session_id}/abort");
    self
      .checked(&format!("POST {path}"), self.request(Method::POST, &path))
      .await?;
    Ok(())
  }

  /// `GET /api/sessions?limit=<n>`
  pub async fn sessions(&self, limit: usize) -> Result<Vec<RefreshSession>> {
    let req = self
      .request(Method::GET, "/sessions")
      .query(&[("limit", limit)]);
    self.send("GET /sessions", req).await
  }

  /// `GET /api/sessions/:id/changes`
  pub async fn session_changes(&self, session_id: Uuid) -> Result<Vec<ChangeRecord>> {
    let path = format!("/sessions/{session_id}/changes");
    self
      .send(&format!("GET {path}"), self.request(Method::GET, &path))
      .await
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  /// `GET /api/entities[?include_disabled=true]`
  pub async fn entities(&self, include_disabled: bool) -> Result<Vec<Entity>> {
    let req = self
      .request(Method::GET, "/entities")
      .query(&[("include_disabled", include_disabled)]);
    self.send("GET /entities", req).await
  }

  /// `POST /api/entities`
  pub async fn add_entity(&self, slug: &str, display_name: &str) -> Result<Entity> {
    let req = self
      .request(Method::POST, "/entities")
      .json(&json!({ "slug": slug, "display_name": display_name }));
    self.send("POST /entities", req).await
  }

  /// `GET /api/entities/:id`
  pub async fn entity(&self, id: Uuid) -> Result<EntityView> {
    let path = format!("/entities/{id}");
    self
      .send(&format!("GET {path}"), self.request(Method::GET, &path))
      .await
  }

  /// `POST /api/entities/:id/enabled`
  pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Entity> {
    let path = format!("/entities/{id}/enabled");
    let req = self
      .request(Method::POST, &path)
      .json(&json!({ "enabled": enabled }));
    self.send(&format!("POST {path}"), req).await
  }

  /// `POST /api/entities/:id/verify`
  pub async fn verify(&self, id: Uuid, user_id: &str) -> Result<DateTime<Utc>> {
    let path = format!("/entities/{id}/verify");
    let req = self
      .request(Method::POST, &path)
      .json(&json!({ "user_id": user_id }));
    let verified: Verified = self.send(&format!("POST {path}"), req).await?;
    Ok(verified.verified_at)
  }

  /// `GET /api/catalog`
  pub async fn catalog(&self) -> Result<FieldCatalog> {
    self
      .send("GET /catalog", self.request(Method::GET, "/catalog"))
      .await
  }

  // ── Corrections ───────────────────────────────────────────────────────────

  /// `POST /api/entities/:id/fields/:field/correct`
  pub async fn correct(
    &self,
    id: Uuid,
    field: &str,
    value: FieldData,
    user_id: &str,
    reason: &str,
  ) -> Result<ChangeRecord> {
    let path = format!("/entities/{id}/fields/{field}/correct");
    let req = self
      .request(Method::POST, &path)
      .json(&json!({ "value": value, "user_id": user_id, "reason": reason }));
    self.send(&format!("POST {path}"), req).await
  }

  /// `POST /api/entities/:id/fields/:field/force`
  pub async fn force(&self, id: Uuid, field: &str, body: &ForceRequest) -> Result<ChangeRecord> {
    let path = format!("/entities/{id}/fields/{field}/force");
    let req = self.request(Method::POST, &path).json(body);
    self.send(&format!("POST {path}"), req).await
  }

  // ── Audit & quality ───────────────────────────────────────────────────────

  /// `GET /api/entities/:id/audit[?since=...]`
  pub async fn audit_trail(
    &self,
    id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<ChangeRecord>> {
    let path = format!("/entities/{id}/audit");
    let mut req = self.request(Method::GET, &path);
    if let Some(since) = since {
      req = req.query(&[("since", since.to_rfc3339())]);
    }
    self.send(&format!("GET {path}"), req).await
  }

  /// `GET /api/audit/verify`
  pub async fn verify_audit(&self) -> Result<AuditVerification> {
    self
      .send("GET /audit/verify", self.request(Method::GET, "/audit/verify"))
      .await
  }

  /// `GET /api/quality[?entity_ids=...]`
  pub async fn quality(&self, ids: &[Uuid]) -> Result<Vec<QualityScore>> {
    let mut req = self.request(Method::GET, "/quality");
    if !ids.is_empty() {
      let joined = ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(",");
      req = req.query(&[("entity_ids", joined)]);
    }
    self.send("GET /quality", req).await
  }

  /// `GET /api/quality/stale[?threshold=...]`
  pub async fn stale(&self, threshold: Option<f64>) -> Result<Vec<StaleField>> {
    let mut req = self.request(Method::GET, "/quality/stale");
    if let Some(t) = threshold {
      req = req.query(&[("threshold", t)]);
    }
    self.send("GET /quality/stale", req).await
  }
}
