//! Error taxonomy for `conflux-core`.
//!
//! Three classes, all of which abort the current request's transaction:
//! [`Error::Validation`] is the caller's fault; the link-integrity variants
//! and [`Error::Storage`] are server-side faults. The core performs no
//! recovery beyond transactional rollback and never retries.

use thiserror::Error;

use crate::record::ContactId;

#[derive(Debug, Error)]
pub enum Error {
  /// Neither an email nor a phone number was supplied. Detected before any
  /// store access.
  #[error("at least one of email or phoneNumber is required")]
  Validation,

  /// The resolver revisited a record while walking `linked_id` — the linkage
  /// graph contains a cycle. Never produced by normal operation; repair is
  /// an out-of-band maintenance concern.
  #[error("linkage cycle detected at contact {at}")]
  LinkCycle { at: ContactId },

  /// A `linked_id` referenced a record that does not exist.
  #[error("broken link: contact {from} points at {to}")]
  BrokenLink { from: ContactId, to: ContactId },

  /// Any failure communicating with or committing to the record store,
  /// including transaction and lock conflicts.
  #[error("storage error: {0}")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error as [`Error::Storage`].
  pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Storage(Box::new(e))
  }

  /// True for the two link-integrity variants.
  pub fn is_integrity(&self) -> bool {
    matches!(self, Error::LinkCycle { .. } | Error::BrokenLink { .. })
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
