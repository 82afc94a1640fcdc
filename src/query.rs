//! # Read Model Queries
//!
//! Read operations over the indexed entities. They use direct SQL on any
//! connection to the database file, so readers always see the latest
//! committed chunk via WAL mode while the indexer keeps writing.
//!
//! ```text
//! ┌──────────────────┐        ┌─────────────┐        ┌──────────────────┐
//! │ indexer thread   │ write  │   SQLite    │  read  │ open_reader()    │
//! │ (SqliteStore)    │ ─────► │   (WAL)     │ ◄───── │ + query fns      │
//! └──────────────────┘        └─────────────┘        └──────────────────┘
//! ```
//!
//! The functions mirror what the dApp frontend asks of the hosted index:
//!
//! | Frontend query | Function |
//! |----------------|----------|
//! | `packets(orderBy: timestamp, orderDirection: desc, first: 20)` | [`packets`] |
//! | `packet(id)` | [`packet`] |
//! | `claims(where: {claimer}, orderBy: timestamp, orderDirection: desc)` | [`claims_by_claimer`] |
//!
//! Page sizes are capped at [`MAX_FIRST`], the hosted query service's limit.

use std::path::Path;

use rusqlite::{params, Connection, OpenFlags, Row};

use crate::codec::{b256_from_blob, packet_id_from_blob, u64_from_sql, u64_to_sql};
use crate::error::{Error, Result};
use crate::model::{Anomaly, AnomalyKind, Claim, Packet};
use crate::sqlite_store::{read_checkpoint, read_claim, read_packet, CLAIM_COLUMNS, PACKET_COLUMNS};
use crate::types::{Address, Cursor, PacketId};

/// Largest page any query returns.
pub const MAX_FIRST: usize = 1000;

/// Page size when the caller doesn't pick one.
pub const DEFAULT_FIRST: usize = 100;

/// Opens a read-only connection to an indexed database.
///
/// The file must already have been created by [`Database::open`](crate::Database::open).
pub fn open_reader(path: impl AsRef<Path>) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

// =============================================================================
// Ordering
// =============================================================================

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

impl Direction {
    fn sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Sort key for [`packets`].
///
/// Amount columns are big-endian BLOBs, so SQLite's bytewise ordering is
/// numeric ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacketOrderBy {
    #[default]
    Timestamp,
    TotalAmount,
    RemainingAmount,
}

impl PacketOrderBy {
    fn column(self) -> &'static str {
        match self {
            PacketOrderBy::Timestamp => "timestamp",
            PacketOrderBy::TotalAmount => "total_amount",
            PacketOrderBy::RemainingAmount => "remaining_amount",
        }
    }
}

/// Parameters for [`packets`]. The default is the frontend's landing page
/// query: newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketQuery {
    pub first: usize,
    pub skip: usize,
    pub order_by: PacketOrderBy,
    pub direction: Direction,
}

impl Default for PacketQuery {
    fn default() -> Self {
        Self {
            first: DEFAULT_FIRST,
            skip: 0,
            order_by: PacketOrderBy::default(),
            direction: Direction::default(),
        }
    }
}

fn limit(first: usize) -> Result<i64> {
    u64_to_sql(first.min(MAX_FIRST) as u64, "first")
}

// =============================================================================
// Packets
// =============================================================================

/// A page of packets. Ties on the sort key are broken by id.
pub fn packets(conn: &Connection, query: PacketQuery) -> Result<Vec<Packet>> {
    let sql = format!(
        "SELECT {PACKET_COLUMNS} FROM packets ORDER BY {column} {dir}, id {dir} LIMIT ?1 OFFSET ?2",
        column = query.order_by.column(),
        dir = query.direction.sql(),
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![limit(query.first)?, u64_to_sql(query.skip as u64, "skip")?])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_packet(row)?);
    }
    Ok(out)
}

pub fn packet(conn: &Connection, id: &PacketId) -> Result<Option<Packet>> {
    let sql = format!("SELECT {PACKET_COLUMNS} FROM packets WHERE id = ?1");
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![id.as_slice()])?;

    match rows.next()? {
        Some(row) => Ok(Some(read_packet(row)?)),
        None => Ok(None),
    }
}

// =============================================================================
// Claims
// =============================================================================

/// Claims made by one address, ordered by claim time.
pub fn claims_by_claimer(
    conn: &Connection,
    claimer: &Address,
    first: usize,
    direction: Direction,
) -> Result<Vec<Claim>> {
    let sql = format!(
        "SELECT {CLAIM_COLUMNS} FROM claims WHERE claimer = ?1 \
         ORDER BY timestamp {dir}, id {dir} LIMIT ?2",
        dir = direction.sql(),
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![claimer.as_slice(), limit(first)?])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_claim(row)?);
    }
    Ok(out)
}

/// Every claim against one packet, oldest first.
pub fn claims_for_packet(conn: &Connection, id: &PacketId) -> Result<Vec<Claim>> {
    let sql = format!(
        "SELECT {CLAIM_COLUMNS} FROM claims WHERE packet_id = ?1 ORDER BY timestamp ASC, id ASC"
    );
    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(params![id.as_slice()])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_claim(row)?);
    }
    Ok(out)
}

/// The contract's `hasClaimed(id, user)` view, answered from indexed data.
pub fn has_claimed(conn: &Connection, id: &PacketId, claimer: &Address) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM claims WHERE packet_id = ?1 AND claimer = ?2)",
        params![id.as_slice(), claimer.as_slice()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

// =============================================================================
// Bookkeeping
// =============================================================================

fn read_anomaly(row: &Row<'_>) -> Result<Anomaly> {
    let kind: String = row.get(0)?;
    let kind = AnomalyKind::parse(&kind)
        .ok_or_else(|| Error::Schema(format!("unknown anomaly kind {kind:?}")))?;
    let packet_id = row
        .get::<_, Option<Vec<u8>>>(1)?
        .map(|bytes| packet_id_from_blob(&bytes, "packet_id"))
        .transpose()?;

    Ok(Anomaly {
        kind,
        packet_id,
        tx_hash: b256_from_blob(&row.get::<_, Vec<u8>>(2)?, "tx_hash")?,
        log_index: u64_from_sql(row.get(3)?, "log_index")?,
        block_number: u64_from_sql(row.get(4)?, "block_number")?,
        detail: row.get(5)?,
    })
}

/// The most recent anomalies, newest first.
pub fn anomalies(conn: &Connection, limit: usize) -> Result<Vec<Anomaly>> {
    let mut stmt = conn.prepare_cached(
        "SELECT kind, packet_id, tx_hash, log_index, block_number, detail
         FROM anomalies ORDER BY seq DESC LIMIT ?1",
    )?;
    let mut rows = stmt.query(params![u64_to_sql(limit as u64, "limit")?])?;

    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_anomaly(row)?);
    }
    Ok(out)
}

/// Position of the last log the indexer consumed.
pub fn checkpoint(conn: &Connection) -> Result<Option<Cursor>> {
    read_checkpoint(conn)
}
