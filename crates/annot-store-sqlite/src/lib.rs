//! SQLite backend for the annotation store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Foreign keys are enforced, so the
//! cascade rules in [`schema`] are applied by SQLite itself.

mod encode;
mod store;

pub mod error;
pub mod schema;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
