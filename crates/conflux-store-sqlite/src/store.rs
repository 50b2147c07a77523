//! [`SqliteStore`] — the SQLite implementation of [`IdentityStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, ToSql, TransactionBehavior};

use conflux_core::{
  Error as CoreError, engine,
  record::{ContactId, ContactRecord, Fragment, LinkPrecedence, NewContact},
  store::{IdentityStore, RecordTx},
  view::ConsolidatedIdentity,
};

use crate::{
  Result,
  encode::{CONTACT_COLUMNS, RawContact, encode_dt, encode_precedence},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Conflux record store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Fetch a single record by id, outside any identify transaction.
  /// Diagnostic read; the engine never uses it.
  pub async fn get_record(&self, id: ContactId) -> Result<Option<ContactRecord>> {
    let raw: Option<RawContact> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CONTACT_COLUMNS} FROM Contact WHERE id = ?1"),
              rusqlite::params![id],
              RawContact::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawContact::into_record).transpose()
  }

  /// Every record in creation order. Diagnostic read.
  pub async fn all_records(&self) -> Result<Vec<ContactRecord>> {
    let raws: Vec<RawContact> = self
      .conn
      .call(|conn| {
        let mut stmt = conn
          .prepare(&format!("SELECT {CONTACT_COLUMNS} FROM Contact ORDER BY id"))?;
        let rows = stmt
          .query_map([], RawContact::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawContact::into_record).collect()
  }
}

// ─── IdentityStore impl ──────────────────────────────────────────────────────

impl IdentityStore for SqliteStore {
  async fn identify(
    &self,
    fragment: Fragment,
  ) -> conflux_core::Result<ConsolidatedIdentity> {
    self
      .conn
      .call(move |conn| Ok(run_identify(conn, &fragment)))
      .await
      .map_err(CoreError::storage)?
  }
}

/// Run the full pipeline inside one IMMEDIATE transaction.
///
/// IMMEDIATE takes the write lock up front, so concurrent identify calls
/// serialise: neither can double-create a primary for the same fragment or
/// observe a half-merged cluster. Any error drops the transaction
/// uncommitted, which rolls it back.
fn run_identify(
  conn: &mut rusqlite::Connection,
  fragment: &Fragment,
) -> conflux_core::Result<ConsolidatedIdentity> {
  let tx = conn
    .transaction_with_behavior(TransactionBehavior::Immediate)
    .map_err(CoreError::storage)?;

  let view = engine::identify(&mut TxRecords { tx: &tx }, fragment)?;

  tx.commit().map_err(CoreError::storage)?;
  Ok(view)
}

// ─── RecordTx impl ───────────────────────────────────────────────────────────

/// [`RecordTx`] over one open transaction. All failures (including decode
/// failures on stored text) surface as [`CoreError::Storage`].
struct TxRecords<'a> {
  tx: &'a rusqlite::Transaction<'a>,
}

impl TxRecords<'_> {
  fn query_records(
    &self,
    sql: &str,
    params: &[&dyn ToSql],
  ) -> conflux_core::Result<Vec<ContactRecord>> {
    let mut stmt = self.tx.prepare(sql).map_err(CoreError::storage)?;
    let raws = stmt
      .query_map(params, RawContact::from_row)
      .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
      .map_err(CoreError::storage)?;

    raws
      .into_iter()
      .map(|raw| raw.into_record().map_err(CoreError::storage))
      .collect()
  }
}

impl RecordTx for TxRecords<'_> {
  fn find_matches(
    &mut self,
    email: Option<&str>,
    phone: Option<&str>,
  ) -> conflux_core::Result<Vec<ContactRecord>> {
    // deletedAt is carried but not filtered on; soft-delete semantics are
    // unspecified and await product clarification.
    match (email, phone) {
      (Some(e), Some(p)) => self.query_records(
        &format!(
          "SELECT {CONTACT_COLUMNS} FROM Contact WHERE email = ?1 OR phoneNumber = ?2"
        ),
        &[&e, &p],
      ),
      (Some(e), None) => self.query_records(
        &format!("SELECT {CONTACT_COLUMNS} FROM Contact WHERE email = ?1"),
        &[&e],
      ),
      (None, Some(p)) => self.query_records(
        &format!("SELECT {CONTACT_COLUMNS} FROM Contact WHERE phoneNumber = ?1"),
        &[&p],
      ),
      (None, None) => Err(CoreError::Validation),
    }
  }

  fn get(&mut self, id: ContactId) -> conflux_core::Result<Option<ContactRecord>> {
    let raw = self
      .tx
      .query_row(
        &format!("SELECT {CONTACT_COLUMNS} FROM Contact WHERE id = ?1"),
        rusqlite::params![id],
        RawContact::from_row,
      )
      .optional()
      .map_err(CoreError::storage)?;

    raw
      .map(|r| r.into_record().map_err(CoreError::storage))
      .transpose()
  }

  fn demote(
    &mut self,
    ids: &[ContactId],
    new_primary: ContactId,
  ) -> conflux_core::Result<()> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
      "UPDATE Contact SET linkPrecedence = 'secondary', linkedId = ?, updatedAt = ?
       WHERE id IN ({placeholders})"
    );

    let now_str = encode_dt(Utc::now());
    let mut params: Vec<&dyn ToSql> = vec![&new_primary, &now_str];
    for id in ids {
      params.push(id);
    }

    self
      .tx
      .execute(&sql, &params[..])
      .map_err(CoreError::storage)?;
    Ok(())
  }

  fn insert(&mut self, new: NewContact) -> conflux_core::Result<ContactRecord> {
    let now = Utc::now();
    let now_str = encode_dt(now);
    let precedence = if new.linked_id.is_some() {
      LinkPrecedence::Secondary
    } else {
      LinkPrecedence::Primary
    };

    self
      .tx
      .execute(
        "INSERT INTO Contact (email, phoneNumber, linkedId, linkPrecedence, createdAt, updatedAt)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
        rusqlite::params![
          new.email,
          new.phone_number,
          new.linked_id,
          encode_precedence(precedence),
          now_str,
        ],
      )
      .map_err(CoreError::storage)?;

    Ok(ContactRecord {
      id: self.tx.last_insert_rowid(),
      email: new.email,
      phone_number: new.phone_number,
      linked_id: new.linked_id,
      link_precedence: precedence,
      created_at: now,
      updated_at: now,
      deleted_at: None,
    })
  }

  fn cluster_of(
    &mut self,
    primary_id: ContactId,
  ) -> conflux_core::Result<Vec<ContactRecord>> {
    // Two-hop closure: the primary, its direct children, and records still
    // pointing at a child demoted earlier in this transaction.
    self.query_records(
      &format!(
        "SELECT {CONTACT_COLUMNS} FROM Contact
         WHERE id = ?1
            OR linkedId = ?1
            OR linkedId IN (SELECT id FROM Contact WHERE linkedId = ?1)
         ORDER BY id"
      ),
      &[&primary_id],
    )
  }
}
