//! Runs one refresh session to completion.
//!
//! Each target entity becomes one unit of work: resolve every catalog field,
//! then commit the entity through the [`ChangeDetector`] in one batch. Units
//! run in parallel under a semaphore. The orchestrator is the only writer of
//! the session record; pollers see it through a `watch` channel of
//! [`SessionProgress`] snapshots.

use std::{
  panic::AssertUnwindSafe,
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
};

use chrono::Utc;
use futures::{FutureExt as _, StreamExt as _, stream};
use tokio::{
  sync::{Notify, Semaphore, watch},
  task::JoinSet,
};
use tracing::Instrument as _;
use uuid::Uuid;
use vantage_core::{
  entity::Entity,
  field::FieldCatalog,
  session::{RefreshSession, SessionError, SessionErrorKind, SessionProgress, SessionStatus},
  store::{FieldStore, RejectReason},
};

use crate::{
  Error,
  config::EngineConfig,
  detector::{ChangeDetector, EntityCommit, Resolved},
  resolver::{Resolution, SourceResolver},
  source::SourceErrorKind,
  summarize::{Summarizer, summarize_or_fallback},
};

/// `failure_reason` of a session stopped by an abort request.
pub const ABORTED: &str = "aborted";

// ─── Abort signal ────────────────────────────────────────────────────────────

#[derive(Default)]
struct AbortInner {
  flag:   AtomicBool,
  notify: Notify,
}

/// A one-shot, clonable abort flag that can also be awaited.
#[derive(Clone, Default)]
pub struct AbortSignal {
  inner: Arc<AbortInner>,
}

impl AbortSignal {
  pub fn abort(&self) {
    self.inner.flag.store(true, Ordering::SeqCst);
    self.inner.notify.notify_waiters();
  }

  pub fn is_aborted(&self) -> bool { self.inner.flag.load(Ordering::SeqCst) }

  /// Resolves once [`abort`](Self::abort) has been called.
  pub async fn aborted(&self) {
    loop {
      let notified = self.inner.notify.notified();
      if self.is_aborted() {
        return;
      }
      notified.await;
    }
  }
}

// ─── Units ───────────────────────────────────────────────────────────────────

enum UnitReport {
  Done {
    entity_id: Uuid,
    commit:    EntityCommit,
    errors:    Vec<SessionError>,
  },
  StoreFailed {
    entity_id: Uuid,
    error:     Error,
  },
  Panicked {
    entity_id: Uuid,
  },
  /// Never started because the session was stopped first.
  Skipped,
}

fn session_error(
  entity_id: Uuid,
  field: Option<String>,
  kind: SessionErrorKind,
  message: String,
) -> SessionError {
  SessionError { entity_id, field, kind, message, at: Utc::now() }
}

/// Classify a resolution that found nothing. `None` when the tiers simply had
/// no data.
fn unavailable(entity_id: Uuid, field: &str, resolution: &Resolution) -> Option<SessionError> {
  let Resolution::NoData { failures, .. } = resolution else { return None };
  if !resolution.all_tiers_failed() {
    return None;
  }
  let kind = if failures.iter().all(|f| f.kind == SourceErrorKind::ParseError) {
    SessionErrorKind::ValidationError
  } else {
    SessionErrorKind::SourceUnavailable
  };
  let message = failures
    .iter()
    .map(|f| format!("{}: {} ({})", f.tier, f.kind, f.message))
    .collect::<Vec<_>>()
    .join("; ");
  Some(session_error(entity_id, Some(field.to_owned()), kind, message))
}

// ─── Orchestrator ────────────────────────────────────────────────────────────

pub struct Orchestrator<S> {
  store:      Arc<S>,
  detector:   ChangeDetector<S>,
  resolver:   Arc<SourceResolver>,
  catalog:    Arc<FieldCatalog>,
  summarizer: Arc<dyn Summarizer>,
  config:     Arc<EngineConfig>,
}

impl<S> Clone for Orchestrator<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      detector:   self.detector.clone(),
      resolver:   Arc::clone(&self.resolver),
      catalog:    Arc::clone(&self.catalog),
      summarizer: Arc::clone(&self.summarizer),
      config:     Arc::clone(&self.config),
    }
  }
}

impl<S: FieldStore + 'static> Orchestrator<S> {
  pub fn new(
    store: Arc<S>,
    resolver: Arc<SourceResolver>,
    catalog: Arc<FieldCatalog>,
    summarizer: Arc<dyn Summarizer>,
    config: EngineConfig,
  ) -> Self {
    Self {
      detector: ChangeDetector::new(Arc::clone(&store)),
      store,
      resolver,
      catalog,
      summarizer,
      config: Arc::new(config),
    }
  }

  /// Drive `session` over `targets` until every unit has reported, then
  /// summarise and persist it. Returns the final record.
  pub async fn run(
    &self,
    mut session: RefreshSession,
    targets: Vec<Entity>,
    abort: AbortSignal,
    progress: &watch::Sender<SessionProgress>,
  ) -> RefreshSession {
    let session_id = session.session_id;
    tracing::info!(
      session_id = %session_id,
      trigger = %session.trigger,
      targets = targets.len(),
      "refresh session started"
    );

    let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
    let mut units = JoinSet::new();
    for entity in targets {
      let this = self.clone();
      let semaphore = Arc::clone(&semaphore);
      let abort = abort.clone();
      units.spawn(async move {
        let Ok(_permit) = semaphore.acquire_owned().await else {
          return UnitReport::Skipped;
        };
        if abort.is_aborted() {
          return UnitReport::Skipped;
        }
        let entity_id = entity.entity_id;
        AssertUnwindSafe(this.run_unit(entity, session_id))
          .catch_unwind()
          .await
          .unwrap_or(UnitReport::Panicked { entity_id })
      });
    }
    progress.send_replace(session.progress());

    loop {
      let joined = tokio::select! {
        joined = units.join_next() => joined,
        _ = abort.aborted(), if session.is_running() => {
          tracing::warn!(
            session_id = %session_id,
            in_flight = units.len(),
            "refresh aborted; letting in-flight entities finish"
          );
          session.finish(SessionStatus::Failed, Some(ABORTED.into()));
          progress.send_replace(session.progress());
          continue;
        }
      };
      let Some(joined) = joined else { break };

      match joined {
        Ok(report) => self.absorb(&mut session, report, &abort),
        Err(e) => tracing::error!(session_id = %session_id, error = %e, "entity task failed"),
      }
      progress.send_replace(session.progress());
    }

    session.finish(SessionStatus::Completed, None);
    session.summary = Some(self.summarize(&session).await);

    if let Err(e) = self.store.save_session(session.clone()).await {
      tracing::error!(session_id = %session_id, error = %e, "failed to persist session");
    }
    progress.send_replace(session.progress());

    tracing::info!(
      session_id = %session_id,
      status = %session.status,
      completed = session.completed_count,
      changes = session.changes_detected,
      new_values = session.new_values_added,
      blocked = session.blocked_corrections,
      errors = session.errors.len(),
      "refresh session finished"
    );
    session
  }

  fn absorb(&self, session: &mut RefreshSession, report: UnitReport, abort: &AbortSignal) {
    match report {
      UnitReport::Skipped => {}
      UnitReport::Done { commit, errors, .. } => {
        session.completed_count += 1;
        session.blocked_corrections += commit.blocked;
        session.errors.extend(errors);
        for record in commit.changes {
          session.record_change(record, self.config.recent_changes_cap);
        }
      }
      UnitReport::Panicked { entity_id } => {
        session.completed_count += 1;
        tracing::error!(entity_id = %entity_id, "entity unit panicked");
        session.errors.push(session_error(
          entity_id,
          None,
          SessionErrorKind::EntityFailed,
          "entity processing panicked".into(),
        ));
      }
      UnitReport::StoreFailed { entity_id, error } => {
        session.completed_count += 1;
        tracing::error!(
          session_id = %session.session_id,
          entity_id = %entity_id,
          error = %error,
          "field store failure; failing session"
        );
        session.errors.push(session_error(
          entity_id,
          None,
          SessionErrorKind::EntityFailed,
          error.to_string(),
        ));
        session.finish(SessionStatus::Failed, Some(format!("field store failure: {error}")));
        // No point dispatching more work against a broken store.
        abort.abort();
      }
    }
  }

  async fn run_unit(&self, entity: Entity, session_id: Uuid) -> UnitReport {
    let span = tracing::info_span!("entity", session_id = %session_id, slug = %entity.slug);
    async {
      let entity_id = entity.entity_id;
      let resolver = &self.resolver;
      let entity = &entity;

      let resolutions: Vec<_> = stream::iter(self.catalog.iter().cloned())
        .map(|spec| async move {
          let resolution = resolver.resolve(entity, &spec).await;
          (spec, resolution)
        })
        .buffered(self.config.field_parallelism.max(1))
        .collect()
        .await;

      let mut resolved = Vec::new();
      let mut errors = Vec::new();
      for (spec, resolution) in resolutions {
        if let Some(err) = unavailable(entity_id, &spec.name, &resolution) {
          errors.push(err);
        }
        if let Resolution::Found { value, tier, confidence } = resolution {
          resolved.push(Resolved { spec, value, tier, confidence });
        }
      }

      if resolved.is_empty() {
        return UnitReport::Done { entity_id, commit: EntityCommit::default(), errors };
      }

      match self.detector.commit_entity(entity_id, Some(session_id), resolved).await {
        Ok(commit) => {
          errors.extend(commit.rejected.iter().map(|(field, reason)| {
            let kind = match reason {
              RejectReason::EntityNotFound => SessionErrorKind::EntityFailed,
              _ => SessionErrorKind::ValidationError,
            };
            session_error(entity_id, Some(field.clone()), kind, format!("{reason:?}"))
          }));
          UnitReport::Done { entity_id, commit, errors }
        }
        Err(error) => UnitReport::StoreFailed { entity_id, error },
      }
    }
    .instrument(span)
    .await
  }

  async fn summarize(&self, session: &RefreshSession) -> String {
    let changes = match self.store.session_changes(session.session_id).await {
      Ok(changes) => changes,
      Err(e) => {
        tracing::warn!(
          session_id = %session.session_id,
          error = %e,
          "could not load session changes; summarising the recent window"
        );
        session.recent_changes.clone()
      }
    };
    summarize_or_fallback(
      self.summarizer.as_ref(),
      session,
      &changes,
      self.config.summarizer_timeout(),
    )
    .await
  }
}
