//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings; `linkPrecedence` as the
//! lowercase strings the original table used.

use chrono::{DateTime, Utc};
use conflux_core::record::{ContactId, ContactRecord, LinkPrecedence};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── LinkPrecedence ──────────────────────────────────────────────────────────

pub fn encode_precedence(p: LinkPrecedence) -> &'static str {
  match p {
    LinkPrecedence::Primary => "primary",
    LinkPrecedence::Secondary => "secondary",
  }
}

pub fn decode_precedence(s: &str) -> Result<LinkPrecedence> {
  match s {
    "primary" => Ok(LinkPrecedence::Primary),
    "secondary" => Ok(LinkPrecedence::Secondary),
    other => Err(Error::UnknownPrecedence(other.to_owned())),
  }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

/// The SELECT column list every Contact read uses, in [`RawContact`] order.
pub const CONTACT_COLUMNS: &str =
  "id, email, phoneNumber, linkedId, linkPrecedence, createdAt, updatedAt, deletedAt";

/// A Contact row as it comes out of SQLite, before text fields are parsed.
pub struct RawContact {
  pub id:              ContactId,
  pub email:           Option<String>,
  pub phone_number:    Option<String>,
  pub linked_id:       Option<ContactId>,
  pub link_precedence: String,
  pub created_at:      String,
  pub updated_at:      String,
  pub deleted_at:      Option<String>,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(RawContact {
      id:              row.get(0)?,
      email:           row.get(1)?,
      phone_number:    row.get(2)?,
      linked_id:       row.get(3)?,
      link_precedence: row.get(4)?,
      created_at:      row.get(5)?,
      updated_at:      row.get(6)?,
      deleted_at:      row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<ContactRecord> {
    Ok(ContactRecord {
      id:              self.id,
      email:           self.email,
      phone_number:    self.phone_number,
      linked_id:       self.linked_id,
      link_precedence: decode_precedence(&self.link_precedence)?,
      created_at:      decode_dt(&self.created_at)?,
      updated_at:      decode_dt(&self.updated_at)?,
      deleted_at:      self.deleted_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}
