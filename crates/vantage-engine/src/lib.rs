//! The Vantage refresh engine.
//!
//! Ties the pure domain logic in `vantage-core` to the outside world:
//!
//! - [`source`] — per-tier data providers behind the [`source::Source`] trait.
//! - [`resolver::SourceResolver`] — Live → Secondary → KnownFallback
//!   resolution with per-call timeouts.
//! - [`detector::ChangeDetector`] — the automated write path into a
//!   [`vantage_core::store::FieldStore`].
//! - [`orchestrator::Orchestrator`] and [`manager::SessionHandle`] — bounded,
//!   mutually exclusive refresh sessions.
//! - [`scorer::QualityService`] — read-only quality reports.
//! - [`engine::Engine`] — the facade used by the API and binaries.

pub mod config;
pub mod detector;
pub mod engine;
pub mod error;
pub mod manager;
pub mod orchestrator;
pub mod resolver;
pub mod scheduler;
pub mod scorer;
pub mod source;
pub mod summarize;

pub use engine::{Engine, EngineBuilder};
pub use error::{Error, Result};

#[cfg(test)]
mod testing;
