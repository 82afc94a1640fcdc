//! # SQLite Entity Store
//!
//! [`SqliteStore`] implements [`EntityStore`] on top of a rusqlite
//! connection, with an LRU cache of recently touched packets in front of the
//! `packets` table.
//!
//! ## Cache Discipline
//!
//! ```text
//! load_packet:  cache ──hit──► clone
//!                 │
//!                miss──► SELECT FROM packets
//!
//! save_packet:  UPSERT packets ──ok──► cache.put
//!
//! rollback:     cache.clear()
//! ```
//!
//! The cache may lag the database but must never lead it. Entries are only
//! inserted after the SQL write succeeded, and a rolled-back transaction
//! drops the whole cache because some of its entries may describe writes
//! that no longer exist.
//!
//! ## Immutability in SQL
//!
//! `save_packet` upserts with `ON CONFLICT DO UPDATE` that touches only
//! `remaining_amount` and `remaining_count`, so the immutable packet fields
//! cannot change after creation even if a caller passes a modified packet.
//! Claims use `ON CONFLICT DO NOTHING`.

use std::num::NonZeroUsize;

use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::error;

use crate::codec::{
    address_from_blob, current_time_ms, log_id_from_blob, packet_id_from_blob, u256_from_blob,
    u256_to_blob, u64_from_sql, u64_to_sql, u64_to_sql_saturating,
};
use crate::error::{Error, Result};
use crate::model::{Anomaly, Claim, Packet, PacketClaimedRecord, PacketCreatedRecord};
use crate::schema::Database;
use crate::store::EntityStore;
use crate::types::{Cursor, LogId, PacketId, PacketType};

// =============================================================================
// Row Mapping
// =============================================================================

/// Column list matching [`read_packet`].
pub(crate) const PACKET_COLUMNS: &str = "id, creator, total_amount, remaining_amount, count, \
     remaining_count, packet_type, timestamp";

/// Column list matching [`read_claim`].
pub(crate) const CLAIM_COLUMNS: &str = "id, packet_id, claimer, amount, timestamp";

pub(crate) fn read_packet(row: &Row<'_>) -> Result<Packet> {
    let raw_type: i64 = row.get(6)?;
    let packet_type = u8::try_from(raw_type)
        .ok()
        .and_then(PacketType::from_u8)
        .ok_or_else(|| Error::Schema(format!("column packet_type holds unknown value {raw_type}")))?;

    Ok(Packet {
        id: packet_id_from_blob(&row.get::<_, Vec<u8>>(0)?, "id")?,
        creator: address_from_blob(&row.get::<_, Vec<u8>>(1)?, "creator")?,
        total_amount: u256_from_blob(&row.get::<_, Vec<u8>>(2)?, "total_amount")?,
        remaining_amount: u256_from_blob(&row.get::<_, Vec<u8>>(3)?, "remaining_amount")?,
        count: u64_from_sql(row.get(4)?, "count")?,
        remaining_count: u64_from_sql(row.get(5)?, "remaining_count")?,
        packet_type,
        timestamp: u64_from_sql(row.get(7)?, "timestamp")?,
    })
}

pub(crate) fn read_claim(row: &Row<'_>) -> Result<Claim> {
    Ok(Claim {
        id: log_id_from_blob(&row.get::<_, Vec<u8>>(0)?, "id")?,
        packet: packet_id_from_blob(&row.get::<_, Vec<u8>>(1)?, "packet_id")?,
        claimer: address_from_blob(&row.get::<_, Vec<u8>>(2)?, "claimer")?,
        amount: u256_from_blob(&row.get::<_, Vec<u8>>(3)?, "amount")?,
        timestamp: u64_from_sql(row.get(4)?, "timestamp")?,
    })
}

/// Reads the checkpoint row, if any.
pub(crate) fn read_checkpoint(conn: &Connection) -> Result<Option<Cursor>> {
    let raw: Option<(i64, i64)> = conn
        .query_row(
            "SELECT block_number, log_index FROM checkpoint WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    raw.map(|(block, index)| {
        Ok(Cursor {
            block_number: u64_from_sql(block, "block_number")?,
            log_index: u64_from_sql(index, "log_index")?,
        })
    })
    .transpose()
}

// =============================================================================
// Store
// =============================================================================

/// Durable [`EntityStore`] backed by SQLite.
pub struct SqliteStore {
    conn: Connection,
    cache: LruCache<PacketId, Packet>,
}

impl SqliteStore {
    /// Wraps an initialized database.
    ///
    /// # Errors
    ///
    /// `Error::Config` if `cache_size` is zero.
    pub fn new(db: Database, cache_size: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(cache_size)
            .ok_or_else(|| Error::Config("packet_cache_size must be positive".to_string()))?;

        Ok(Self {
            conn: db.into_connection(),
            cache: LruCache::new(capacity),
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Number of packets currently cached.
    pub fn cached_packets(&self) -> usize {
        self.cache.len()
    }

    /// Runs `f` inside `BEGIN IMMEDIATE … COMMIT`.
    ///
    /// On error the transaction is rolled back, the packet cache is cleared
    /// and the error is returned unchanged.
    pub fn transaction<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;

        match f(self) {
            Ok(value) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    self.rollback();
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn rollback(&mut self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            error!(error = %e, "rollback failed");
        }
        self.cache.clear();
    }

    /// Position of the last applied log.
    pub fn checkpoint(&self) -> Result<Option<Cursor>> {
        read_checkpoint(&self.conn)
    }

    /// Moves the checkpoint to `cursor`.
    pub fn set_checkpoint(&mut self, cursor: &Cursor) -> Result<()> {
        self.conn.execute(
            "INSERT INTO checkpoint (id, block_number, log_index, updated_ms)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                block_number = excluded.block_number,
                log_index = excluded.log_index,
                updated_ms = excluded.updated_ms",
            params![
                u64_to_sql(cursor.block_number, "block_number")?,
                u64_to_sql(cursor.log_index, "log_index")?,
                u64_to_sql(current_time_ms(), "updated_ms")?,
            ],
        )?;
        Ok(())
    }
}

impl EntityStore for SqliteStore {
    fn load_packet(&self, id: &PacketId) -> Result<Option<Packet>> {
        // peek: loads don't need &mut, recency is refreshed on save
        if let Some(packet) = self.cache.peek(id) {
            return Ok(Some(packet.clone()));
        }

        let sql = format!("SELECT {PACKET_COLUMNS} FROM packets WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![id.as_slice()])?;

        match rows.next()? {
            Some(row) => Ok(Some(read_packet(row)?)),
            None => Ok(None),
        }
    }

    fn save_packet(&mut self, packet: &Packet) -> Result<()> {
        let total = u256_to_blob(&packet.total_amount);
        let remaining = u256_to_blob(&packet.remaining_amount);

        self.conn.execute(
            "INSERT INTO packets (id, creator, total_amount, remaining_amount, count,
                                  remaining_count, packet_type, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                remaining_amount = excluded.remaining_amount,
                remaining_count = excluded.remaining_count",
            params![
                packet.id.as_slice(),
                packet.creator.as_slice(),
                &total[..],
                &remaining[..],
                u64_to_sql(packet.count, "count")?,
                u64_to_sql(packet.remaining_count, "remaining_count")?,
                i64::from(packet.packet_type.as_u8()),
                u64_to_sql(packet.timestamp, "timestamp")?,
            ],
        )?;

        self.cache.put(packet.id, packet.clone());
        Ok(())
    }

    fn load_claim(&self, id: &LogId) -> Result<Option<Claim>> {
        let sql = format!("SELECT {CLAIM_COLUMNS} FROM claims WHERE id = ?1");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(params![&id.as_bytes()[..]])?;

        match rows.next()? {
            Some(row) => Ok(Some(read_claim(row)?)),
            None => Ok(None),
        }
    }

    fn save_claim(&mut self, claim: &Claim) -> Result<()> {
        let amount = u256_to_blob(&claim.amount);

        self.conn.execute(
            "INSERT INTO claims (id, packet_id, claimer, amount, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO NOTHING",
            params![
                &claim.id.as_bytes()[..],
                claim.packet.as_slice(),
                claim.claimer.as_slice(),
                &amount[..],
                u64_to_sql(claim.timestamp, "timestamp")?,
            ],
        )?;
        Ok(())
    }

    fn save_created_record(&mut self, record: &PacketCreatedRecord) -> Result<()> {
        let total = u256_to_blob(&record.total_amount);

        self.conn.execute(
            "INSERT OR REPLACE INTO packet_created_events
                (id, packet_id, creator, total_amount, count, packet_type,
                 block_number, block_timestamp, tx_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &record.id.as_bytes()[..],
                record.packet_id.as_slice(),
                record.creator.as_slice(),
                &total[..],
                u64_to_sql(record.count, "count")?,
                i64::from(record.packet_type.as_u8()),
                u64_to_sql(record.block.block_number, "block_number")?,
                u64_to_sql(record.block.block_timestamp, "block_timestamp")?,
                record.block.tx_hash.as_slice(),
            ],
        )?;
        Ok(())
    }

    fn save_claimed_record(&mut self, record: &PacketClaimedRecord) -> Result<()> {
        let amount = u256_to_blob(&record.amount);

        self.conn.execute(
            "INSERT OR REPLACE INTO packet_claimed_events
                (id, packet_id, claimer, amount, block_number, block_timestamp, tx_hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &record.id.as_bytes()[..],
                record.packet_id.as_slice(),
                record.claimer.as_slice(),
                &amount[..],
                u64_to_sql(record.block.block_number, "block_number")?,
                u64_to_sql(record.block.block_timestamp, "block_timestamp")?,
                record.block.tx_hash.as_slice(),
            ],
        )?;
        Ok(())
    }

    /// Position columns saturate: a decode failure may describe a log whose
    /// metadata was out of range, and the exact values are in `detail`.
    fn record_anomaly(&mut self, anomaly: &Anomaly) -> Result<()> {
        self.conn.execute(
            "INSERT INTO anomalies
                (kind, packet_id, tx_hash, log_index, block_number, detail, recorded_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                anomaly.kind.as_str(),
                anomaly.packet_id.as_ref().map(|id| id.as_slice()),
                anomaly.tx_hash.as_slice(),
                u64_to_sql_saturating(anomaly.log_index),
                u64_to_sql_saturating(anomaly.block_number),
                anomaly.detail,
                u64_to_sql(current_time_ms(), "recorded_ms")?,
            ],
        )?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
