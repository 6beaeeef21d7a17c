//! [`Engine`], the single entry point the API and binaries talk to.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use vantage_core::{
  audit::{self, AuditVerification},
  change::ChangeRecord,
  entity::{Entity, EntityView},
  field::{Confidence, FieldCatalog, FieldData, SourceTier},
  quality::{QualityConfig, QualityScore, StaleField},
  session::{RefreshSession, RefreshTarget, RefreshTrigger, SessionProgress},
  store::{FieldStore, ForcedUpdate, ManualCorrection},
};

use crate::{
  Error, Result,
  config::{EngineConfig, TierConfidence},
  manager::SessionHandle,
  orchestrator::Orchestrator,
  resolver::SourceResolver,
  scorer::QualityService,
  summarize::{StaticSummarizer, Summarizer},
};

// ─── Builder ─────────────────────────────────────────────────────────────────

pub struct EngineBuilder<S> {
  store:      Arc<S>,
  resolver:   Option<SourceResolver>,
  summarizer: Arc<dyn Summarizer>,
  catalog:    FieldCatalog,
  quality:    QualityConfig,
  config:     EngineConfig,
}

impl<S: FieldStore + 'static> EngineBuilder<S> {
  pub fn resolver(mut self, resolver: SourceResolver) -> Self {
    self.resolver = Some(resolver);
    self
  }

  pub fn summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
    self.summarizer = summarizer;
    self
  }

  pub fn catalog(mut self, catalog: FieldCatalog) -> Self {
    self.catalog = catalog;
    self
  }

  pub fn quality(mut self, quality: QualityConfig) -> Self {
    self.quality = quality;
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  /// Spawn the session manager and return the running engine. Must be called
  /// inside a tokio runtime.
  pub fn start(self) -> Engine<S> {
    let resolver = self
      .resolver
      .unwrap_or_else(|| SourceResolver::new(self.config.source_timeout()));
    let catalog = Arc::new(self.catalog);
    let default_confidence = self.config.confidence.clone();

    let orchestrator = Orchestrator::new(
      Arc::clone(&self.store),
      Arc::new(resolver),
      Arc::clone(&catalog),
      self.summarizer,
      self.config,
    );
    let sessions = SessionHandle::spawn(Arc::clone(&self.store), orchestrator);
    let quality = QualityService::new(Arc::clone(&self.store), Arc::clone(&catalog), self.quality);

    Engine { store: self.store, catalog, quality, sessions, default_confidence }
  }
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct Engine<S> {
  store:              Arc<S>,
  catalog:            Arc<FieldCatalog>,
  quality:            QualityService<S>,
  sessions:           SessionHandle<S>,
  default_confidence: TierConfidence,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self {
      store:              Arc::clone(&self.store),
      catalog:            Arc::clone(&self.catalog),
      quality:            self.quality.clone(),
      sessions:           self.sessions.clone(),
      default_confidence: self.default_confidence.clone(),
    }
  }
}

fn require_text(what: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(Error::InvalidInput(format!("{what} must not be empty")));
  }
  Ok(())
}

fn valid_slug(slug: &str) -> bool {
  !slug.is_empty()
    && slug
      .chars()
      .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
}

impl<S: FieldStore + 'static> Engine<S> {
  pub fn builder(store: Arc<S>) -> EngineBuilder<S> {
    EngineBuilder {
      store,
      resolver: None,
      summarizer: Arc::new(StaticSummarizer),
      catalog: FieldCatalog::default(),
      quality: QualityConfig::default(),
      config: EngineConfig::default(),
    }
  }

  pub fn catalog(&self) -> &FieldCatalog { &self.catalog }

  pub fn sessions(&self) -> &SessionHandle<S> { &self.sessions }

  async fn require_entity(&self, id: Uuid) -> Result<Entity> {
    self
      .store
      .get_entity(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(id))
  }

  // ── Sessions ──────────────────────────────────────────────────────────────

  /// Start a refresh. Fails with [`Error::ConcurrentSessionRejected`] while
  /// another session is running.
  pub async fn start_refresh(
    &self,
    target: RefreshTarget,
    trigger: RefreshTrigger,
  ) -> Result<Uuid> {
    self.sessions.start_refresh(target, trigger).await
  }

  pub async fn session_progress(&self, session_id: Uuid) -> Result<SessionProgress> {
    self.sessions.progress(session_id).await
  }

  pub async fn abort_refresh(&self, session_id: Uuid) -> Result<()> {
    self.sessions.abort_refresh(session_id).await
  }

  /// Block until the session has finished and been persisted.
  pub async fn wait_for_session(&self, session_id: Uuid) -> Result<RefreshSession> {
    self.sessions.wait(session_id).await
  }

  pub async fn get_session(&self, session_id: Uuid) -> Result<RefreshSession> {
    self
      .store
      .get_session(session_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SessionNotFound(session_id))
  }

  pub async fn list_sessions(&self, limit: usize) -> Result<Vec<RefreshSession>> {
    self.store.list_sessions(limit).await.map_err(Error::store)
  }

  /// Every change a session committed, oldest first.
  pub async fn session_changes(&self, session_id: Uuid) -> Result<Vec<ChangeRecord>> {
    self.get_session(session_id).await?;
    self.store.session_changes(session_id).await.map_err(Error::store)
  }

  // ── Entities ──────────────────────────────────────────────────────────────

  pub async fn add_entity(&self, slug: &str, display_name: &str) -> Result<Entity> {
    let slug = slug.trim();
    if !valid_slug(slug) {
      return Err(Error::InvalidInput(format!(
        "slug {slug:?} must be lowercase letters, digits, '-' or '_'"
      )));
    }
    require_text("display name", display_name)?;
    let entity = self
      .store
      .add_entity(slug.to_owned(), display_name.trim().to_owned())
      .await
      .map_err(|e| {
        if S::is_duplicate_slug(&e) {
          Error::DuplicateSlug(slug.to_owned())
        } else {
          Error::store(e)
        }
      })?;
    tracing::info!(entity_id = %entity.entity_id, slug = %entity.slug, "entity registered");
    Ok(entity)
  }

  pub async fn list_entities(&self, include_disabled: bool) -> Result<Vec<Entity>> {
    self.store.list_entities(include_disabled).await.map_err(Error::store)
  }

  pub async fn get_entity(&self, id: Uuid) -> Result<EntityView> {
    self
      .store
      .materialize(id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(id))
  }

  pub async fn set_entity_enabled(&self, id: Uuid, enabled: bool) -> Result<Entity> {
    self
      .store
      .set_entity_enabled(id, enabled)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(id))
  }

  // ── Corrections ───────────────────────────────────────────────────────────

  /// Apply a user correction and protect the field from automated refresh.
  pub async fn manual_correct(
    &self,
    entity_id: Uuid,
    field: &str,
    value: FieldData,
    user_id: &str,
    reason: &str,
  ) -> Result<ChangeRecord> {
    require_text("user id", user_id)?;
    require_text("reason", reason)?;
    let spec = self.catalog.require(field)?.clone();
    spec.check_kind(&value)?;
    self.require_entity(entity_id).await?;

    self
      .store
      .manual_correct(ManualCorrection {
        entity_id,
        spec,
        value,
        user_id: user_id.to_owned(),
        reason: reason.to_owned(),
      })
      .await
      .map_err(Error::store)
  }

  /// Overwrite a field even if it holds a manual correction, clearing the
  /// protection. `confidence` defaults to the tier's configured confidence.
  #[allow(clippy::too_many_arguments)]
  pub async fn force_update(
    &self,
    entity_id: Uuid,
    field: &str,
    value: FieldData,
    source_tier: SourceTier,
    confidence: Option<Confidence>,
    user_id: &str,
    reason: &str,
  ) -> Result<ChangeRecord> {
    require_text("user id", user_id)?;
    require_text("reason", reason)?;
    if !source_tier.is_automated() {
      return Err(Error::InvalidInput(
        "a forced update must name an automated tier; use a manual correction instead".into(),
      ));
    }
    let spec = self.catalog.require(field)?.clone();
    spec.check_kind(&value)?;
    self.require_entity(entity_id).await?;

    self
      .store
      .force_update(ForcedUpdate {
        entity_id,
        spec,
        value,
        source_tier,
        confidence: confidence.unwrap_or_else(|| self.default_confidence.for_tier(source_tier)),
        user_id: user_id.to_owned(),
        reason: reason.to_owned(),
      })
      .await
      .map_err(Error::store)
  }

  /// Record that a human has verified the entity's data.
  pub async fn verify_entity(&self, entity_id: Uuid, user_id: &str) -> Result<DateTime<Utc>> {
    require_text("user id", user_id)?;
    let at = self
      .store
      .mark_verified(entity_id, user_id.to_owned())
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(entity_id))?;
    tracing::info!(entity_id = %entity_id, user_id, "entity verified");
    Ok(at)
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  /// Committed changes for an entity, oldest first.
  pub async fn audit_trail(
    &self,
    entity_id: Uuid,
    since: Option<DateTime<Utc>>,
  ) -> Result<Vec<ChangeRecord>> {
    self.require_entity(entity_id).await?;
    let entries = self
      .store
      .audit_trail(entity_id, since)
      .await
      .map_err(Error::store)?;
    Ok(entries.into_iter().map(|e| e.record).collect())
  }

  /// Walk the whole audit chain and check every link.
  pub async fn verify_audit_chain(&self) -> Result<AuditVerification> {
    let chain = self.store.audit_chain().await.map_err(Error::store)?;
    let verification = audit::verify_chain(&chain)?;
    if !verification.valid {
      tracing::error!(
        first_broken = ?verification.first_broken,
        entries = verification.entries,
        "audit chain verification failed"
      );
    }
    Ok(verification)
  }

  // ── Quality ───────────────────────────────────────────────────────────────

  pub async fn quality_scores(&self, entity_ids: Option<&[Uuid]>) -> Result<Vec<QualityScore>> {
    self.quality.scores(entity_ids).await
  }

  pub async fn stale_fields(&self, threshold: Option<f64>) -> Result<Vec<StaleField>> {
    self.quality.stale_fields(threshold).await
  }
}
