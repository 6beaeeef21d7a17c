//! JSON REST API for Vantage.
//!
//! Exposes an axum [`Router`] backed by a running [`Engine`] over any
//! [`vantage_core::store::FieldStore`]. Auth, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", vantage_api::api_router(engine.clone()))
//! ```

pub mod audit;
pub mod entities;
pub mod error;
pub mod quality;
pub mod sessions;

use axum::{
  Router,
  routing::{get, post},
};
use vantage_core::store::FieldStore;
use vantage_engine::Engine;

pub use error::ApiError;

/// Build a fully-materialised API router for `engine`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(engine: Engine<S>) -> Router<()>
where
  S: FieldStore + 'static,
{
  Router::new()
    // Sessions
    .route("/sessions", get(sessions::list::<S>).post(sessions::start::<S>))
    .route("/sessions/{id}", get(sessions::get_one::<S>))
    .route("/sessions/{id}/progress", get(sessions::progress::<S>))
    .route("/sessions/{id}/changes", get(sessions::changes::<S>))
    .route("/sessions/{id}/abort", post(sessions::abort::<S>))
    // Entities
    .route("/entities", get(entities::list::<S>).post(entities::create::<S>))
    .route("/entities/{id}", get(entities::get_one::<S>))
    .route("/entities/{id}/enabled", post(entities::set_enabled::<S>))
    .route("/entities/{id}/verify", post(entities::verify::<S>))
    .route("/entities/{id}/fields/{field}/correct", post(entities::correct::<S>))
    .route("/entities/{id}/fields/{field}/force", post(entities::force::<S>))
    .route("/catalog", get(entities::catalog::<S>))
    // Audit
    .route("/entities/{id}/audit", get(audit::trail::<S>))
    .route("/audit/verify", get(audit::verify::<S>))
    // Quality
    .route("/quality", get(quality::scores::<S>))
    .route("/quality/stale", get(quality::stale::<S>))
    .with_state(engine)
}

#[cfg(test)]
mod tests;
