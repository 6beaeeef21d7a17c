//! In-process sources shared by the engine's tests.

use std::{
  collections::HashMap,
  sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  },
  time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Semaphore;
use uuid::Uuid;
use vantage_core::{
  entity::Entity,
  field::{FieldData, FieldSpec},
};

use crate::source::{Source, SourceError, SourceErrorKind};

pub(crate) fn entity(slug: &str) -> Entity {
  Entity {
    entity_id:    Uuid::new_v4(),
    slug:         slug.into(),
    display_name: slug.into(),
    enabled:      true,
    created_at:   Utc::now(),
  }
}

/// Gives the same answer for every entity and field.
pub(crate) struct Scripted {
  pub answer: Result<Option<FieldData>, SourceError>,
  pub delay:  Option<Duration>,
  pub calls:  AtomicUsize,
}

impl Scripted {
  pub(crate) fn value(v: FieldData) -> Arc<Self> { Self::with_answer(Ok(Some(v))) }

  pub(crate) fn empty() -> Arc<Self> { Self::with_answer(Ok(None)) }

  pub(crate) fn failing(kind: SourceErrorKind) -> Arc<Self> {
    Self::with_answer(Err(SourceError::new(kind, "scripted failure")))
  }

  pub(crate) fn with_answer(answer: Result<Option<FieldData>, SourceError>) -> Arc<Self> {
    Arc::new(Self { answer, delay: None, calls: AtomicUsize::new(0) })
  }
}

#[async_trait]
impl Source for Scripted {
  fn name(&self) -> &str { "scripted" }

  async fn fetch(
    &self,
    _entity: &Entity,
    _field: &FieldSpec,
  ) -> Result<Option<FieldData>, SourceError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    self.answer.clone()
  }
}

/// Answers from a `(slug, field)` table; anything missing is "no value".
#[derive(Default)]
pub(crate) struct Table {
  answers: HashMap<(String, String), Result<FieldData, SourceError>>,
}

impl Table {
  pub(crate) fn with(mut self, slug: &str, field: &str, value: FieldData) -> Self {
    self.answers.insert((slug.into(), field.into()), Ok(value));
    self
  }

  pub(crate) fn failing(mut self, slug: &str, field: &str, kind: SourceErrorKind) -> Self {
    self
      .answers
      .insert((slug.into(), field.into()), Err(SourceError::new(kind, "table failure")));
    self
  }

  pub(crate) fn shared(self) -> Arc<Self> { Arc::new(self) }
}

#[async_trait]
impl Source for Table {
  fn name(&self) -> &str { "table" }

  async fn fetch(
    &self,
    entity: &Entity,
    field: &FieldSpec,
  ) -> Result<Option<FieldData>, SourceError> {
    match self.answers.get(&(entity.slug.clone(), field.name.clone())) {
      Some(Ok(value)) => Ok(Some(value.clone())),
      Some(Err(e)) => Err(e.clone()),
      None => Ok(None),
    }
  }
}

/// Blocks every fetch until [`Gated::open`] is called, then delegates.
pub(crate) struct Gated {
  inner:       Arc<dyn Source>,
  gate:        Semaphore,
  pub started: AtomicUsize,
}

impl Gated {
  pub(crate) fn new(inner: Arc<dyn Source>) -> Arc<Self> {
    Arc::new(Self { inner, gate: Semaphore::new(0), started: AtomicUsize::new(0) })
  }

  pub(crate) fn open(&self) { self.gate.add_permits(1 << 20); }
}

#[async_trait]
impl Source for Gated {
  fn name(&self) -> &str { "gated" }

  async fn fetch(
    &self,
    entity: &Entity,
    field: &FieldSpec,
  ) -> Result<Option<FieldData>, SourceError> {
    self.started.fetch_add(1, Ordering::SeqCst);
    let _permit = self
      .gate
      .acquire()
      .await
      .map_err(|_| SourceError::new(SourceErrorKind::Unreachable, "gate closed"))?;
    self.inner.fetch(entity, field).await
  }
}
