//! SQLite backend for the Conflux record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Each identify call executes
//! as one IMMEDIATE transaction, which is what gives the resolution
//! pipeline its required isolation.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
