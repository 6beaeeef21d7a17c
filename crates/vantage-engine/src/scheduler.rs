//! Interval trigger for scheduled refreshes.

use std::time::Duration;

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use vantage_core::{
  session::{RefreshTarget, RefreshTrigger},
  store::FieldStore,
};

use crate::{Error, manager::SessionHandle};

/// Enqueue a scheduled refresh of every enabled entity every `every`. The
/// first refresh fires one full period after spawning. A tick that lands on a
/// running session is logged and dropped, not queued.
pub fn spawn_interval_trigger<S>(sessions: SessionHandle<S>, every: Duration) -> JoinHandle<()>
where
  S: FieldStore + 'static,
{
  tokio::spawn(async move {
    tracing::info!(?every, "scheduled refresh trigger started");
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      interval.tick().await;
      match sessions
        .start_refresh(RefreshTarget::All, RefreshTrigger::Scheduled)
        .await
      {
        Ok(session_id) => tracing::info!(session_id = %session_id, "scheduled refresh started"),
        Err(Error::ConcurrentSessionRejected(active)) => {
          tracing::info!(active = %active, "scheduled refresh skipped; session in progress")
        }
        Err(Error::ManagerStopped) => {
          tracing::info!("session manager gone; stopping scheduled trigger");
          return;
        }
        Err(e) => tracing::error!(error = %e, "scheduled refresh failed to start"),
      }
    }
  })
}
