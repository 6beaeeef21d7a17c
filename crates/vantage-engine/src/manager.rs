//! The session manager: a single-consumer actor that owns the active session.
//!
//! Every trigger, whether manual or scheduled, is a message on one queue. The
//! actor handles messages one at a time, so "is a session running?" and
//! "start one" can never interleave. Pollers get immutable
//! [`SessionProgress`] snapshots, never the live record.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;
use vantage_core::{
  entity::Entity,
  session::{RefreshSession, RefreshTarget, RefreshTrigger, SessionProgress},
  store::FieldStore,
};

use crate::{
  Error, Result,
  orchestrator::{AbortSignal, Orchestrator},
};

const QUEUE_DEPTH: usize = 32;

enum Command {
  Start {
    target:  RefreshTarget,
    trigger: RefreshTrigger,
    reply:   oneshot::Sender<Result<Uuid>>,
  },
  Abort {
    session_id: Uuid,
    reply:      oneshot::Sender<Result<()>>,
  },
  Lookup {
    session_id: Uuid,
    reply:      oneshot::Sender<Lookup>,
  },
  Finished {
    session: RefreshSession,
  },
}

enum Lookup {
  Active(watch::Receiver<SessionProgress>),
  Finished(Box<RefreshSession>),
  Unknown,
}

struct Active {
  session_id: Uuid,
  abort:      AbortSignal,
  progress:   watch::Receiver<SessionProgress>,
}

struct SessionManager<S> {
  store:        Arc<S>,
  orchestrator: Orchestrator<S>,
  rx:           mpsc::Receiver<Command>,
  /// Handed to session tasks so they can report back without keeping the
  /// actor alive.
  tx:           mpsc::WeakSender<Command>,
  active:       Option<Active>,
  last:         Option<RefreshSession>,
}

impl<S: FieldStore + 'static> SessionManager<S> {
  async fn run(mut self) {
    while let Some(command) = self.rx.recv().await {
      match command {
        Command::Start { target, trigger, reply } => {
          let _ = reply.send(self.start(target, trigger).await);
        }
        Command::Abort { session_id, reply } => {
          let _ = reply.send(self.abort(session_id).await);
        }
        Command::Lookup { session_id, reply } => {
          let _ = reply.send(self.lookup(session_id));
        }
        Command::Finished { session } => {
          if self.active.as_ref().is_some_and(|a| a.session_id == session.session_id) {
            self.active = None;
          }
          self.last = Some(session);
        }
      }
    }
    tracing::debug!("session manager stopped");
  }

  async fn start(&mut self, target: RefreshTarget, trigger: RefreshTrigger) -> Result<Uuid> {
    if let Some(active) = &self.active {
      tracing::info!(
        active = %active.session_id,
        %trigger,
        "refresh rejected; a session is already running"
      );
      return Err(Error::ConcurrentSessionRejected(active.session_id));
    }

    let targets = self.targets(target).await?;
    let session = RefreshSession::begin(trigger, targets.len());
    let session_id = session.session_id;
    self
      .store
      .save_session(session.clone())
      .await
      .map_err(Error::store)?;

    let (progress_tx, progress_rx) = watch::channel(session.progress());
    let abort = AbortSignal::default();
    let orchestrator = self.orchestrator.clone();
    let report = self.tx.clone();
    let task_abort = abort.clone();
    tokio::spawn(async move {
      let session = orchestrator.run(session, targets, task_abort, &progress_tx).await;
      if let Some(tx) = report.upgrade() {
        let _ = tx.send(Command::Finished { session }).await;
      }
      // Dropping the sender tells waiters the session is fully settled.
      drop(progress_tx);
    });

    self.active = Some(Active { session_id, abort, progress: progress_rx });
    Ok(session_id)
  }

  async fn targets(&self, target: RefreshTarget) -> Result<Vec<Entity>> {
    match target {
      RefreshTarget::All => self.store.list_entities(false).await.map_err(Error::store),
      RefreshTarget::Entities(ids) => {
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
          let entity = self
            .store
            .get_entity(id)
            .await
            .map_err(Error::store)?
            .ok_or(Error::EntityNotFound(id))?;
          entities.push(entity);
        }
        Ok(entities)
      }
    }
  }

  async fn abort(&mut self, session_id: Uuid) -> Result<()> {
    if let Some(active) = self.active.as_ref().filter(|a| a.session_id == session_id) {
      tracing::info!(session_id = %session_id, "abort requested");
      active.abort.abort();
      return Ok(());
    }
    let known = self.last.as_ref().is_some_and(|s| s.session_id == session_id)
      || self
        .store
        .get_session(session_id)
        .await
        .map_err(Error::store)?
        .is_some();
    if known {
      Err(Error::SessionNotRunning(session_id))
    } else {
      Err(Error::SessionNotFound(session_id))
    }
  }

  fn lookup(&self, session_id: Uuid) -> Lookup {
    if let Some(active) = self.active.as_ref().filter(|a| a.session_id == session_id) {
      return Lookup::Active(active.progress.clone());
    }
    match &self.last {
      Some(last) if last.session_id == session_id => Lookup::Finished(Box::new(last.clone())),
      _ => Lookup::Unknown,
    }
  }
}

// ─── Handle ──────────────────────────────────────────────────────────────────

/// A cheap, clonable handle to the session manager task.
pub struct SessionHandle<S> {
  tx:    mpsc::Sender<Command>,
  store: Arc<S>,
}

impl<S> Clone for SessionHandle<S> {
  fn clone(&self) -> Self {
    Self { tx: self.tx.clone(), store: Arc::clone(&self.store) }
  }
}

impl<S: FieldStore + 'static> SessionHandle<S> {
  /// Spawn the manager task. Must be called inside a tokio runtime. The task
  /// exits once every handle has been dropped.
  pub fn spawn(store: Arc<S>, orchestrator: Orchestrator<S>) -> Self {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let manager = SessionManager {
      store: Arc::clone(&store),
      orchestrator,
      rx,
      tx: tx.downgrade(),
      active: None,
      last: None,
    };
    tokio::spawn(manager.run());
    Self { tx, store }
  }

  async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(make(reply)).await.map_err(|_| Error::ManagerStopped)?;
    rx.await.map_err(|_| Error::ManagerStopped)
  }

  /// Start a session unless one is already running.
  pub async fn start_refresh(
    &self,
    target: RefreshTarget,
    trigger: RefreshTrigger,
  ) -> Result<Uuid> {
    self
      .request(|reply| Command::Start { target, trigger, reply })
      .await?
  }

  pub async fn abort_refresh(&self, session_id: Uuid) -> Result<()> {
    self.request(|reply| Command::Abort { session_id, reply }).await?
  }

  pub async fn progress(&self, session_id: Uuid) -> Result<SessionProgress> {
    match self.request(|reply| Command::Lookup { session_id, reply }).await? {
      Lookup::Active(rx) => Ok(rx.borrow().clone()),
      Lookup::Finished(session) => Ok(session.progress()),
      Lookup::Unknown => self
        .stored(session_id)
        .await
        .map(|session| session.progress()),
    }
  }

  /// Wait until `session_id` has finished and been persisted.
  pub async fn wait(&self, session_id: Uuid) -> Result<RefreshSession> {
    loop {
      match self.request(|reply| Command::Lookup { session_id, reply }).await? {
        Lookup::Active(mut rx) => while rx.changed().await.is_ok() {},
        Lookup::Finished(session) => return Ok(*session),
        Lookup::Unknown => return self.stored(session_id).await,
      }
    }
  }

  async fn stored(&self, session_id: Uuid) -> Result<RefreshSession> {
    self
      .store
      .get_session(session_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::SessionNotFound(session_id))
  }
}
