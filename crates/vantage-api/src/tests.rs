//! Router tests over an in-memory store and a static fallback dataset.

use std::{sync::Arc, time::Duration};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt as _;
use uuid::Uuid;
use vantage_core::field::{Confidence, SourceTier};
use vantage_engine::{Engine, resolver::SourceResolver, source::StaticDataset};
use vantage_store_sqlite::SqliteStore;

use crate::api_router;

const DATASET: &str = r#"{
  "acme": { "ceo": "Ada Lovelace", "pricing_model": "subscription" }
}"#;

async fn app() -> Router {
  let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
  let dataset = StaticDataset::from_json("fixture", DATASET).unwrap();
  let resolver = SourceResolver::new(Duration::from_secs(2))
    .with_tier(SourceTier::KnownFallback, Arc::new(dataset), Confidence::new(40))
    .unwrap();
  let engine = Engine::builder(store).resolver(resolver).start();
  api_router(engine)
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(body) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(body.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let resp = app.clone().oneshot(req).await.unwrap();
  let status = resp.status();
  let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, value)
}

async fn create_entity(app: &Router, slug: &str) -> String {
  let (status, body) = call(
    app,
    "POST",
    "/entities",
    Some(json!({ "slug": slug, "display_name": slug.to_uppercase() })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");
  body["entity_id"].as_str().unwrap().to_owned()
}

/// Poll until the session leaves `running`.
async fn settle(app: &Router, session_id: &str) -> Value {
  for _ in 0..200 {
    let (status, progress) =
      call(app, "GET", &format!("/sessions/{session_id}/progress"), None).await;
    assert_eq!(status, StatusCode::OK);
    if progress["status"] != "running" && !progress["summary"].is_null() {
      return progress;
    }
    tokio::time::sleep(Duration::from_millis(5)).await;
  }
  panic!("session {session_id} did not finish");
}

// ── Entities ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn entity_registry_round_trip() {
  let app = app().await;
  let id = create_entity(&app, "acme").await;

  let (status, body) = call(&app, "GET", &format!("/entities/{id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["entity"]["slug"], "acme");

  let (status, _) = call(
    &app,
    "POST",
    "/entities",
    Some(json!({ "slug": "acme", "display_name": "Other" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);

  let (status, body) = call(
    &app,
    "POST",
    &format!("/entities/{id}/enabled"),
    Some(json!({ "enabled": false })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["enabled"], false);

  let (_, listed) = call(&app, "GET", "/entities", None).await;
  assert_eq!(listed.as_array().unwrap().len(), 0);
  let (_, listed) = call(&app, "GET", "/entities?include_disabled=true", None).await;
  assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_entity_is_404_with_json_error() {
  let app = app().await;
  let (status, body) = call(&app, "GET", &format!("/entities/{}", Uuid::new_v4()), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("entity not found"));
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_then_inspect_session() {
  let app = app().await;
  let id = create_entity(&app, "acme").await;

  let (status, started) = call(&app, "POST", "/sessions", Some(json!({}))).await;
  assert_eq!(status, StatusCode::ACCEPTED);
  let session_id = started["session_id"].as_str().unwrap().to_owned();

  let progress = settle(&app, &session_id).await;
  assert_eq!(progress["status"], "completed");
  assert_eq!(progress["changes_detected"], 2);
  assert_eq!(progress["new_values_added"], 2);
  assert_eq!(progress["total"], 1);
  assert_eq!(progress["summary"], "2 changes across 1 entities");

  let (status, changes) = call(&app, "GET", &format!("/sessions/{session_id}/changes"), None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(changes.as_array().unwrap().len(), 2);

  let (_, sessions) = call(&app, "GET", "/sessions?limit=5", None).await;
  assert_eq!(sessions[0]["session_id"], session_id.as_str());
  assert_eq!(sessions[0]["trigger"], "manual");

  let (_, view) = call(&app, "GET", &format!("/entities/{id}"), None).await;
  assert_eq!(view["fields"]["ceo"]["source_tier"], "known_fallback");

  let (status, _) = call(&app, "POST", &format!("/sessions/{session_id}/abort"), None).await;
  assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_session_is_404() {
  let app = app().await;
  let missing = Uuid::new_v4();
  let (status, _) = call(&app, "GET", &format!("/sessions/{missing}/progress"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  let (status, _) = call(&app, "POST", &format!("/sessions/{missing}/abort"), None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn refresh_of_unknown_entity_is_404() {
  let app = app().await;
  let body = json!({ "target": { "scope": "entities", "entity_ids": [Uuid::new_v4()] } });
  let (status, _) = call(&app, "POST", "/sessions", Some(body)).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Corrections and audit ────────────────────────────────────────────────────

#[tokio::test]
async fn correction_survives_refresh_and_is_audited() {
  let app = app().await;
  let id = create_entity(&app, "acme").await;

  let (status, record) = call(
    &app,
    "POST",
    &format!("/entities/{id}/fields/pricing_model/correct"),
    Some(json!({
      "value": { "type": "category", "data": "usage-based" },
      "user_id": "analyst-1",
      "reason": "pricing page changed"
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{record}");
  assert_eq!(record["change_type"], "new");

  let (_, started) = call(&app, "POST", "/sessions", Some(json!({}))).await;
  let progress = settle(&app, started["session_id"].as_str().unwrap()).await;
  assert_eq!(progress["blocked_corrections"], 1);

  let (_, view) = call(&app, "GET", &format!("/entities/{id}"), None).await;
  assert_eq!(view["fields"]["pricing_model"]["value"]["data"], "usage-based");
  assert_eq!(view["fields"]["pricing_model"]["manually_corrected"], true);

  let (status, trail) = call(&app, "GET", &format!("/entities/{id}/audit"), None).await;
  assert_eq!(status, StatusCode::OK);
  // The correction plus the refreshed ceo.
  assert_eq!(trail.as_array().unwrap().len(), 2);

  let (_, verification) = call(&app, "GET", "/audit/verify", None).await;
  assert_eq!(verification["valid"], true);
  assert_eq!(verification["entries"], 2);
}

#[tokio::test]
async fn correction_validation_maps_to_400() {
  let app = app().await;
  let id = create_entity(&app, "acme").await;

  let (status, _) = call(
    &app,
    "POST",
    &format!("/entities/{id}/fields/employee_count/correct"),
    Some(json!({
      "value": { "type": "text", "data": "lots" },
      "user_id": "analyst-1",
      "reason": "typo"
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = call(
    &app,
    "POST",
    &format!("/entities/{id}/fields/no_such_field/correct"),
    Some(json!({
      "value": { "type": "text", "data": "x" },
      "user_id": "analyst-1",
      "reason": "typo"
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _) = call(
    &app,
    "POST",
    &format!("/entities/{id}/fields/ceo/force"),
    Some(json!({
      "value": { "type": "text", "data": "Grace" },
      "source_tier": "manual",
      "user_id": "lead-1",
      "reason": "override"
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn force_update_uses_tier_confidence() {
  let app = app().await;
  let id = create_entity(&app, "acme").await;

  let (status, record) = call(
    &app,
    "POST",
    &format!("/entities/{id}/fields/ceo/force"),
    Some(json!({
      "value": { "type": "text", "data": "Grace Hopper" },
      "source_tier": "secondary",
      "user_id": "lead-1",
      "reason": "board announcement"
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{record}");

  let (_, view) = call(&app, "GET", &format!("/entities/{id}"), None).await;
  assert_eq!(view["fields"]["ceo"]["confidence"], 70);
  assert_eq!(view["fields"]["ceo"]["manually_corrected"], false);
}

// ── Quality ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn quality_reports() {
  let app = app().await;
  let id = create_entity(&app, "acme").await;

  let (status, verified) = call(
    &app,
    "POST",
    &format!("/entities/{id}/verify"),
    Some(json!({ "user_id": "analyst-1" })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert!(verified["verified_at"].is_string());

  let (status, scores) = call(&app, "GET", &format!("/quality?entity_ids={id}"), None).await;
  assert_eq!(status, StatusCode::OK);
  let score = &scores[0];
  assert_eq!(score["entity_id"], id.as_str());
  assert_eq!(score["completeness"], 0.0);
  assert_eq!(score["healthy"], false);

  let (status, _) = call(&app, "GET", "/quality?entity_ids=not-a-uuid", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, stale) = call(&app, "GET", "/quality/stale?threshold=50", None).await;
  assert_eq!(status, StatusCode::OK);
  assert!(stale.as_array().unwrap().is_empty());

  let (status, _) = call(&app, "GET", "/quality/stale?threshold=500", None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn catalog_lists_default_fields() {
  let app = app().await;
  let (status, catalog) = call(&app, "GET", "/catalog", None).await;
  assert_eq!(status, StatusCode::OK);
  let names: Vec<&str> = catalog
    .as_array()
    .unwrap()
    .iter()
    .filter_map(|f| f["name"].as_str())
    .collect();
  assert!(names.contains(&"pricing_model"));
  assert!(names.contains(&"ceo"));
}
