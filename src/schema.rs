//! # SQLite Schema for the Red Packet Indexer
//!
//! This module defines the database schema and handles initialization.
//!
//! ## Table Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Schema Overview                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  packets                  claims                   anomalies            │
//! │  ┌──────────────────┐     ┌──────────────────┐     ┌────────────────┐   │
//! │  │ id (PK)          │◄────│ packet_id        │     │ seq (PK)       │   │
//! │  │ creator          │     │ id (PK)          │     │ kind           │   │
//! │  │ total_amount     │     │ claimer          │     │ packet_id      │   │
//! │  │ remaining_amount │     │ amount           │     │ tx_hash        │   │
//! │  │ count            │     │ timestamp        │     │ log_index      │   │
//! │  │ remaining_count  │     └──────────────────┘     │ detail         │   │
//! │  │ packet_type      │                              └────────────────┘   │
//! │  │ timestamp        │                                                   │
//! │  └──────────────────┘                                                   │
//! │                                                                         │
//! │  packet_created_events    packet_claimed_events    checkpoint           │
//! │  (raw log audit trail)    (raw log audit trail)    (single row)         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Decisions
//!
//! ### Why BLOB amounts?
//!
//! `uint256` does not fit in any SQLite numeric type. A 32-byte big-endian
//! BLOB keeps full precision and still sorts correctly (see
//! [`codec`](crate::codec)).
//!
//! ### Why no foreign key from claims to packets?
//!
//! The projection never writes a claim without its packet, so the constraint
//! would only cost an index lookup per insert.

use rusqlite::Connection;

use crate::{Error, Result};

// =============================================================================
// Schema Version
// =============================================================================

/// Current schema version. Increment when making breaking schema changes.
///
/// There are no migrations: a mismatch is an error and the read model is
/// rebuilt by replaying the chain.
const SCHEMA_VERSION: i32 = 1;

// =============================================================================
// DDL Statements
// =============================================================================

/// One row per packet, mutated in place by claims.
const CREATE_PACKETS: &str = r#"
CREATE TABLE IF NOT EXISTS packets (
    id               BLOB PRIMARY KEY,
    creator          BLOB NOT NULL,
    total_amount     BLOB NOT NULL,
    remaining_amount BLOB NOT NULL,
    count            INTEGER NOT NULL,
    remaining_count  INTEGER NOT NULL,
    packet_type      INTEGER NOT NULL,
    timestamp        INTEGER NOT NULL
)
"#;

/// Newest-first packet listings.
const CREATE_PACKETS_TIMESTAMP_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS packets_timestamp
ON packets(timestamp)
"#;

/// One row per applied `PacketClaimed` log.
const CREATE_CLAIMS: &str = r#"
CREATE TABLE IF NOT EXISTS claims (
    id        BLOB PRIMARY KEY,
    packet_id BLOB NOT NULL,
    claimer   BLOB NOT NULL,
    amount    BLOB NOT NULL,
    timestamp INTEGER NOT NULL
)
"#;

/// Supports `claims(where: {claimer}, orderBy: timestamp)`.
const CREATE_CLAIMS_CLAIMER_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS claims_claimer
ON claims(claimer, timestamp)
"#;

/// Supports listing the claims of one packet.
const CREATE_CLAIMS_PACKET_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS claims_packet
ON claims(packet_id, timestamp)
"#;

/// Raw `PacketCreated` logs, keyed by log id.
const CREATE_PACKET_CREATED_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS packet_created_events (
    id              BLOB PRIMARY KEY,
    packet_id       BLOB NOT NULL,
    creator         BLOB NOT NULL,
    total_amount    BLOB NOT NULL,
    count           INTEGER NOT NULL,
    packet_type     INTEGER NOT NULL,
    block_number    INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL,
    tx_hash         BLOB NOT NULL
)
"#;

/// Raw `PacketClaimed` logs, keyed by log id.
const CREATE_PACKET_CLAIMED_EVENTS: &str = r#"
CREATE TABLE IF NOT EXISTS packet_claimed_events (
    id              BLOB PRIMARY KEY,
    packet_id       BLOB NOT NULL,
    claimer         BLOB NOT NULL,
    amount          BLOB NOT NULL,
    block_number    INTEGER NOT NULL,
    block_timestamp INTEGER NOT NULL,
    tx_hash         BLOB NOT NULL
)
"#;

/// Append-only log of flagged inputs.
///
/// `packet_id` is NULL for logs that could not be decoded.
const CREATE_ANOMALIES: &str = r#"
CREATE TABLE IF NOT EXISTS anomalies (
    seq          INTEGER PRIMARY KEY AUTOINCREMENT,
    kind         TEXT NOT NULL,
    packet_id    BLOB,
    tx_hash      BLOB NOT NULL,
    log_index    INTEGER NOT NULL,
    block_number INTEGER NOT NULL,
    detail       TEXT NOT NULL,
    recorded_ms  INTEGER NOT NULL
)
"#;

/// Position of the last applied log.
///
/// Single row, enforced by the CHECK. Updated in the same transaction as the
/// entities it covers, so it can never run ahead of the data.
const CREATE_CHECKPOINT: &str = r#"
CREATE TABLE IF NOT EXISTS checkpoint (
    id           INTEGER PRIMARY KEY CHECK (id = 1),
    block_number INTEGER NOT NULL,
    log_index    INTEGER NOT NULL,
    updated_ms   INTEGER NOT NULL
)
"#;

/// Metadata table for schema versioning.
const CREATE_METADATA: &str = r#"
CREATE TABLE IF NOT EXISTS indexer_metadata (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)
"#;

// =============================================================================
// Database Wrapper
// =============================================================================

/// A SQLite connection with the indexer schema applied.
///
/// `Database` owns its `Connection`; dropping it closes the connection.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database file, creating and initializing it if necessary.
    ///
    /// # Errors
    ///
    /// - `Error::Sqlite` if the file can't be opened or created
    /// - `Error::Schema` if the schema version doesn't match
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use redpacket_indexer::Database;
    ///
    /// let db = Database::open("redpacket.db")?;
    /// # Ok::<(), redpacket_indexer::Error>(())
    /// ```
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Creates an in-memory database for testing.
    ///
    /// ```rust
    /// use redpacket_indexer::Database;
    ///
    /// let db = Database::open_in_memory()?;
    /// # Ok::<(), redpacket_indexer::Error>(())
    /// ```
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let mut db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Applies pragmas, creates tables and checks the schema version.
    fn initialize(&mut self) -> Result<()> {
        // WAL lets query connections read while the indexer writes.
        self.conn.execute_batch("PRAGMA journal_mode = WAL")?;
        self.conn.execute_batch("PRAGMA synchronous = NORMAL")?;

        self.conn.execute_batch(CREATE_METADATA)?;
        self.conn.execute_batch(CREATE_PACKETS)?;
        self.conn.execute_batch(CREATE_PACKETS_TIMESTAMP_INDEX)?;
        self.conn.execute_batch(CREATE_CLAIMS)?;
        self.conn.execute_batch(CREATE_CLAIMS_CLAIMER_INDEX)?;
        self.conn.execute_batch(CREATE_CLAIMS_PACKET_INDEX)?;
        self.conn.execute_batch(CREATE_PACKET_CREATED_EVENTS)?;
        self.conn.execute_batch(CREATE_PACKET_CLAIMED_EVENTS)?;
        self.conn.execute_batch(CREATE_ANOMALIES)?;
        self.conn.execute_batch(CREATE_CHECKPOINT)?;

        self.verify_or_set_version()?;

        Ok(())
    }

    /// Verifies the schema version, or sets it if this is a new database.
    fn verify_or_set_version(&mut self) -> Result<()> {
        let existing: Option<i32> = self
            .conn
            .query_row(
                "SELECT value FROM indexer_metadata WHERE key = 'schema_version'",
                [],
                |row| {
                    let s: String = row.get(0)?;
                    Ok(s.parse().unwrap_or(0))
                },
            )
            .ok();

        match existing {
            None => {
                self.conn.execute(
                    "INSERT INTO indexer_metadata (key, value) VALUES ('schema_version', ?)",
                    [SCHEMA_VERSION.to_string()],
                )?;
            }
            Some(v) if v == SCHEMA_VERSION => {}
            Some(v) => {
                return Err(Error::Schema(format!(
                    "schema version mismatch: database has version {v}, but this indexer requires {SCHEMA_VERSION}"
                )));
            }
        }

        Ok(())
    }

    /// Borrows the underlying connection (for queries).
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the wrapper and returns the connection.
    ///
    /// Used to hand the connection to the indexer thread.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

// =============================================================================
// Tests
// =============================================================================
