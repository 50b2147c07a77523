//! SQL schema for the Conflux SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.
//!
//! Column names stay camelCase for compatibility with the pre-existing
//! Contact table shape other consumers read.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS Contact (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    email          TEXT,
    phoneNumber    TEXT,
    linkedId       INTEGER REFERENCES Contact(id),
    linkPrecedence TEXT NOT NULL DEFAULT 'primary'
                        CHECK (linkPrecedence IN ('primary', 'secondary')),
    createdAt      TEXT NOT NULL,
    updatedAt      TEXT NOT NULL,
    deletedAt      TEXT,
    CHECK (email IS NOT NULL OR phoneNumber IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS contact_email_idx  ON Contact(email);
CREATE INDEX IF NOT EXISTS contact_phone_idx  ON Contact(phoneNumber);
CREATE INDEX IF NOT EXISTS contact_linked_idx ON Contact(linkedId);

PRAGMA user_version = 1;
";
