//! The session summarization collaborator.
//!
//! A [`Summarizer`] turns a finished session's change list into prose. It is
//! never allowed to fail a session: errors and timeouts fall back to
//! [`fallback_summary`].

use std::{collections::BTreeSet, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vantage_core::{change::ChangeRecord, session::RefreshSession};

use crate::config::SummarizerConfig;

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
  #[error("summarizer request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("summarizer returned an empty summary")]
  Empty,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
  async fn summarize(
    &self,
    session: &RefreshSession,
    changes: &[ChangeRecord],
  ) -> Result<String, SummarizeError>;
}

/// `"N changes across M entities"`.
pub fn fallback_summary(changes: &[ChangeRecord]) -> String {
  let entities: BTreeSet<_> = changes.iter().map(|c| c.entity_id).collect();
  format!("{} changes across {} entities", changes.len(), entities.len())
}

/// Ask `summarizer`, substituting the fallback on error, blank output, or
/// timeout.
pub async fn summarize_or_fallback(
  summarizer: &dyn Summarizer,
  session: &RefreshSession,
  changes: &[ChangeRecord],
  timeout: Duration,
) -> String {
  match tokio::time::timeout(timeout, summarizer.summarize(session, changes)).await {
    Ok(Ok(summary)) if !summary.trim().is_empty() => summary,
    Ok(Ok(_)) => {
      tracing::warn!(session_id = %session.session_id, "summarizer returned nothing");
      fallback_summary(changes)
    }
    Ok(Err(e)) => {
      tracing::warn!(session_id = %session.session_id, error = %e, "summarizer failed");
      fallback_summary(changes)
    }
    Err(_) => {
      tracing::warn!(session_id = %session.session_id, ?timeout, "summarizer timed out");
      fallback_summary(changes)
    }
  }
}

/// Always produces the fallback summary. Used when no summarizer endpoint is
/// configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSummarizer;

#[async_trait]
impl Summarizer for StaticSummarizer {
  async fn summarize(
    &self,
    _session: &RefreshSession,
    changes: &[ChangeRecord],
  ) -> Result<String, SummarizeError> {
    Ok(fallback_summary(changes))
  }
}

#[derive(Serialize)]
struct SummaryRequest<'a> {
  session: &'a RefreshSession,
  changes: &'a [ChangeRecord],
}

#[derive(Deserialize)]
struct SummaryResponse {
  summary: String,
}

/// Posts `{"session": .., "changes": [..]}` and expects `{"summary": ".."}`.
#[derive(Debug, Clone)]
pub struct HttpSummarizer {
  client:   reqwest::Client,
  endpoint: String,
  api_key:  Option<String>,
}

impl HttpSummarizer {
  pub fn new(client: reqwest::Client, config: &SummarizerConfig) -> Self {
    Self {
      client,
      endpoint: config.endpoint.clone(),
      api_key: config.api_key.clone(),
    }
  }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
  async fn summarize(
    &self,
    session: &RefreshSession,
    changes: &[ChangeRecord],
  ) -> Result<String, SummarizeError> {
    let mut request = self
      .client
      .post(&self.endpoint)
      .json(&SummaryRequest { session, changes });
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response: SummaryResponse = request.send().await?.error_for_status()?.json().await?;
    let summary = response.summary.trim();
    if summary.is_empty() {
      return Err(SummarizeError::Empty);
    }
    Ok(summary.to_owned())
  }
}
