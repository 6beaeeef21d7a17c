//! Core types and pure logic for the Vantage data collection and quality
//! engine.
//!
//! This crate is deliberately free of HTTP, database, and runtime
//! dependencies. Every other crate depends on it. Storage backends implement
//! [`store::FieldStore`]; the engine drives them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod audit;
pub mod change;
pub mod entity;
pub mod error;
pub mod field;
pub mod quality;
pub mod session;
pub mod store;

pub use error::{Error, Result};
