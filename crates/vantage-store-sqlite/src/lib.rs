//! SQLite backend for the Vantage field store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every write runs inside a single
//! `call` closure and transaction, which makes each field's
//! read-modify-write atomic with respect to concurrent refresh workers.

mod encode;
mod schema;
mod store;
mod txn;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
