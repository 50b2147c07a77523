//! The contact record — the sole persisted entity — and the incoming
//! fragment type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Store-assigned record id. Assigned at creation and totally ordered by
/// creation time, which makes it usable as the merge tie-break.
pub type ContactId = i64;

/// Whether a record is the root of its cluster or subordinate to one.
///
/// The only transition is `Primary` → `Secondary` (demotion during a merge),
/// and it is irreversible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkPrecedence {
  Primary,
  Secondary,
}

/// A row of the Contact table.
///
/// Invariants (holding at rest, i.e. between requests):
/// - `linked_id` is `Some` iff `link_precedence` is `Secondary`;
/// - `email` and `phone_number` are never both `None`;
/// - at most one record per cluster is `Primary`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRecord {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub linked_id:       Option<ContactId>,
  pub link_precedence: LinkPrecedence,
  pub created_at:      DateTime<Utc>,
  pub updated_at:      DateTime<Utc>,
  /// Carried as data; resolution queries do not filter on it.
  pub deleted_at:      Option<DateTime<Utc>>,
}

impl ContactRecord {
  pub fn is_primary(&self) -> bool {
    self.link_precedence == LinkPrecedence::Primary
  }
}

/// What the Record Creator hands the store to persist. The store assigns
/// `id`, `created_at`, and `updated_at`.
#[derive(Debug, Clone)]
pub struct NewContact {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
  /// `None` creates a primary; `Some(id)` creates a secondary under `id`.
  pub linked_id:    Option<ContactId>,
}

/// The partial identifying information supplied in one request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
  pub email:        Option<String>,
  pub phone_number: Option<String>,
}

impl Fragment {
  /// At least one identifying field is required.
  pub fn validate(&self) -> Result<()> {
    if self.email.is_none() && self.phone_number.is_none() {
      return Err(Error::Validation);
    }
    Ok(())
  }

  /// True when `record` already carries exactly this `(email, phoneNumber)`
  /// pair — the fragment would add no new information.
  pub fn matches_exactly(&self, record: &ContactRecord) -> bool {
    record.email == self.email && record.phone_number == self.phone_number
  }
}
