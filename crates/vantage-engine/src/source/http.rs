//! An HTTP source serving one field per request.
//!
//! `GET {base_url}/{slug}/{field}` → `{"value": <json>}`. A `404` means the
//! source has no value; `429` is rate limiting.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use vantage_core::{
  entity::Entity,
  field::{FieldData, FieldSpec},
};

use super::{Source, SourceError, SourceErrorKind, decode_value};
use crate::config::HttpSourceConfig;

#[derive(Debug, Deserialize)]
struct ValueBody {
  #[serde(default)]
  value: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct HttpSource {
  name:     String,
  client:   reqwest::Client,
  base_url: String,
  api_key:  Option<String>,
}

impl HttpSource {
  pub fn new(name: impl Into<String>, client: reqwest::Client, config: &HttpSourceConfig) -> Self {
    Self {
      name: name.into(),
      client,
      base_url: config.base_url.trim_end_matches('/').to_owned(),
      api_key: config.api_key.clone(),
    }
  }

  fn url(&self, entity: &Entity, field: &FieldSpec) -> String {
    format!("{}/{}/{}", self.base_url, entity.slug, field.name)
  }
}

fn transport_error(e: reqwest::Error) -> SourceError {
  let kind = if e.is_timeout() {
    SourceErrorKind::Timeout
  } else if e.is_decode() || e.is_body() {
    SourceErrorKind::ParseError
  } else {
    SourceErrorKind::Unreachable
  };
  SourceError::new(kind, e.to_string())
}

#[async_trait]
impl Source for HttpSource {
  fn name(&self) -> &str { &self.name }

  async fn fetch(
    &self,
    entity: &Entity,
    field: &FieldSpec,
  ) -> Result<Option<FieldData>, SourceError> {
    let mut request = self.client.get(self.url(entity, field));
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response = request.send().await.map_err(transport_error)?;
    match response.status() {
      StatusCode::NOT_FOUND => return Ok(None),
      StatusCode::TOO_MANY_REQUESTS => {
        return Err(SourceError::new(
          SourceErrorKind::RateLimited,
          format!("{} rate limited", self.name),
        ));
      }
      status if !status.is_success() => {
        return Err(SourceError::new(
          SourceErrorKind::Unreachable,
          format!("{} answered {status}", self.name),
        ));
      }
      _ => {}
    }

    let body: ValueBody = response
      .json()
      .await
      .map_err(|e| SourceError::parse(e.to_string()))?;
    decode_value(field, &body.value)
  }
}

#[cfg(test)]
mod tests {
  use axum::{
    Json, Router,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
  };
  use chrono::Utc;
  use serde_json::json;
  use uuid::Uuid;
  use vantage_core::field::FieldCatalog;

  use super::*;

  async fn lookup(Path((slug, field)): Path<(String, String)>) -> Response {
    match (slug.as_str(), field.as_str()) {
      ("acme", "ceo") => Json(json!({ "value": "Ada Lovelace" })).into_response(),
      ("acme", "employee_count") => Json(json!({ "value": "lots" })).into_response(),
      ("acme", "website") => "not json".into_response(),
      ("busy", _) => StatusCode::TOO_MANY_REQUESTS.into_response(),
      ("broken", _) => StatusCode::BAD_GATEWAY.into_response(),
      _ => StatusCode::NOT_FOUND.into_response(),
    }
  }

  async fn serve() -> String {
    let app = Router::new().route("/v1/{slug}/{field}", get(lookup));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    format!("http://{addr}/v1/")
  }

  fn entity(slug: &str) -> Entity {
    Entity {
      entity_id:    Uuid::new_v4(),
      slug:         slug.into(),
      display_name: slug.into(),
      enabled:      true,
      created_at:   Utc::now(),
    }
  }

  async fn source() -> HttpSource {
    let config = HttpSourceConfig { base_url: serve().await, api_key: Some("k".into()) };
    HttpSource::new("live", reqwest::Client::new(), &config)
  }

  #[tokio::test]
  async fn maps_responses_to_outcomes() {
    let src = source().await;
    let catalog = FieldCatalog::default();
    let field = |n: &str| catalog.require(n).unwrap().clone();

    let ceo = src.fetch(&entity("acme"), &field("ceo")).await.unwrap();
    assert_eq!(ceo, Some(FieldData::Text("Ada Lovelace".into())));

    let missing = src.fetch(&entity("acme"), &field("tagline")).await.unwrap();
    assert_eq!(missing, None);

    let wrong_kind = src
      .fetch(&entity("acme"), &field("employee_count"))
      .await
      .unwrap_err();
    assert_eq!(wrong_kind.kind, SourceErrorKind::ParseError);

    let garbage = src.fetch(&entity("acme"), &field("website")).await.unwrap_err();
    assert_eq!(garbage.kind, SourceErrorKind::ParseError);

    let limited = src.fetch(&entity("busy"), &field("ceo")).await.unwrap_err();
    assert_eq!(limited.kind, SourceErrorKind::RateLimited);

    let down = src.fetch(&entity("broken"), &field("ceo")).await.unwrap_err();
    assert_eq!(down.kind, SourceErrorKind::Unreachable);
  }

  #[tokio::test]
  async fn refused_connection_is_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = HttpSourceConfig { base_url: format!("http://{addr}"), api_key: None };
    let src = HttpSource::new("live", reqwest::Client::new(), &config);
    let err = src
      .fetch(&entity("acme"), FieldCatalog::default().require("ceo").unwrap())
      .await
      .unwrap_err();
    assert_eq!(err.kind, SourceErrorKind::Unreachable);
  }
}
