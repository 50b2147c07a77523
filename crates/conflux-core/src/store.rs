//! Storage abstractions implemented by backends (e.g.
//! `conflux-store-sqlite`).
//!
//! Two seams:
//!
//! - [`RecordTx`] is the synchronous, transaction-scoped view the engine
//!   runs against. The whole match → resolve → merge → create → aggregate
//!   sequence for one request executes inside a single store transaction,
//!   so every operation here shares that transaction's isolation and rolls
//!   back together.
//! - [`IdentityStore`] is the async surface the API layer calls. A backend
//!   implements it by opening a transaction, running
//!   [`engine::identify`](crate::engine::identify) against it, and
//!   committing.

use std::future::Future;

use crate::{
  Result,
  record::{ContactId, ContactRecord, Fragment, NewContact},
  view::ConsolidatedIdentity,
};

/// The store operations the resolution engine needs, scoped to one open
/// transaction.
///
/// Backend failures are reported as [`Error::Storage`](crate::Error::Storage)
/// so the engine's own taxonomy (validation / integrity / storage) survives
/// the round trip to the caller.
pub trait RecordTx {
  /// Every record whose email equals `email` OR whose phone number equals
  /// `phone`, for whichever arguments are `Some`. No ordering guarantee.
  fn find_matches(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> Result<Vec<ContactRecord>>;

  /// Fetch a record by id. `None` if it does not exist.
  fn get(&mut self, id: ContactId) -> Result<Option<ContactRecord>>;

  /// Demote each record in `ids` to secondary under `new_primary`, in one
  /// statement: `link_precedence` becomes secondary, `linked_id` becomes
  /// `new_primary`, `updated_at` is refreshed.
  fn demote(&mut self, ids: &[ContactId], new_primary: ContactId) -> Result<()>;

  /// Persist a new record and return it with store-assigned `id` and
  /// timestamps.
  fn insert(&mut self, new: NewContact) -> Result<ContactRecord>;

  /// The transitive closure of `primary_id`: the primary itself, every
  /// record linked directly to it, and every record linked to one of those
  /// (the two-hop shape a merge leaves behind).
  fn cluster_of(&mut self, primary_id: ContactId) -> Result<Vec<ContactRecord>>;
}

/// Async abstraction over a Conflux backend.
///
/// The single operation runs the full resolution pipeline atomically. All
/// methods return `Send` futures so the trait can be used from multi-threaded
/// async runtimes (tokio with `axum`).
pub trait IdentityStore: Send + Sync {
  /// Resolve `fragment` against the store: match, merge clusters if the
  /// fragment connects several, persist a new record if it carries new
  /// information, and return the consolidated identity.
  fn identify(
    &self,
    fragment: Fragment,
  ) -> impl Future<Output = Result<ConsolidatedIdentity>> + Send + '_;
}
