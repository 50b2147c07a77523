//! Error type for `conflux-store-sqlite`.
//!
//! Used by store setup and the inspection helpers. Inside `identify` itself
//! everything is folded into [`conflux_core::Error`] so the engine's
//! taxonomy reaches the caller intact.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown link precedence: {0:?}")]
  UnknownPrecedence(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
