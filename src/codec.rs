//! # Column Encoding
//!
//! Conversions between chain values and SQLite column types.
//!
//! ## Storage Format
//!
//! | Rust | SQLite | Notes |
//! |------|--------|-------|
//! | `U256` | BLOB(32) | big-endian, so `ORDER BY` on the BLOB sorts numerically |
//! | `B256` / `PacketId` | BLOB(32) | |
//! | `Address` | BLOB(20) | |
//! | `LogId` | BLOB(36) | tx hash ++ log index (LE) |
//! | `u64` | INTEGER | must fit in `i64` |
//!
//! SQLite compares BLOBs with `memcmp`, and fixed-width big-endian integers
//! compare the same way bytewise and numerically. That is why amounts are not
//! stored as decimal TEXT.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::types::{Address, LogId, PacketId, B256, LOG_ID_LEN, U256};

// =============================================================================
// Encoding
// =============================================================================

/// Largest integer an INTEGER column holds.
///
/// Chain values are unsigned, SQLite's INTEGER is `i64`. Decoding rejects
/// anything above this so a stored event can always be written.
pub const MAX_SQL_INTEGER: u64 = i64::MAX as u64;

/// Big-endian 32-byte form of an amount.
pub fn u256_to_blob(value: &U256) -> [u8; 32] {
    value.to_be_bytes::<32>()
}

/// Converts an unsigned value to SQLite's signed INTEGER.
pub fn u64_to_sql(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| Error::Schema(format!("{column} value {value} does not fit in INTEGER")))
}

/// Like [`u64_to_sql`], but clamps instead of failing.
///
/// For bookkeeping columns that describe a log the decoder already rejected.
pub fn u64_to_sql_saturating(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Decoding
// =============================================================================

fn fixed<const N: usize>(bytes: &[u8], column: &str) -> Result<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|_| {
        Error::Schema(format!(
            "column {column} holds {} bytes, expected {N}",
            bytes.len()
        ))
    })
}

pub fn u256_from_blob(bytes: &[u8], column: &str) -> Result<U256> {
    Ok(U256::from_be_bytes(fixed::<32>(bytes, column)?))
}

pub fn b256_from_blob(bytes: &[u8], column: &str) -> Result<B256> {
    Ok(B256::from(fixed::<32>(bytes, column)?))
}

pub fn packet_id_from_blob(bytes: &[u8], column: &str) -> Result<PacketId> {
    b256_from_blob(bytes, column).map(PacketId::new)
}

pub fn address_from_blob(bytes: &[u8], column: &str) -> Result<Address> {
    Ok(Address::from(fixed::<20>(bytes, column)?))
}

pub fn log_id_from_blob(bytes: &[u8], column: &str) -> Result<LogId> {
    Ok(LogId::from_bytes(fixed::<LOG_ID_LEN>(bytes, column)?))
}

pub fn u64_from_sql(value: i64, column: &str) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| Error::Schema(format!("column {column} holds negative value {value}")))
}

/// Wall-clock time in milliseconds, for bookkeeping columns.
pub fn current_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================
