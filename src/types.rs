//! # Domain Types for the Red Packet Indexer
//!
//! This module defines the identifiers and small value types shared by every
//! other module: packet ids, log ids, the split policy and the block metadata
//! the indexing host attaches to each log.
//!
//! ## Design Philosophy: Newtypes for Safety
//!
//! Packet ids and transaction hashes are both 32-byte hashes. Wrapping the
//! packet id in its own type means a transaction hash can never be passed
//! where a packet id is expected:
//!
//! ```rust
//! use redpacket_indexer::types::{PacketId, B256};
//!
//! let id = PacketId::new(B256::repeat_byte(0x11));
//! let tx = B256::repeat_byte(0x22);
//! // PacketId::from(tx) is explicit; `id == tx` won't compile.
//! assert_ne!(id.as_b256(), &tx);
//! ```
//!
//! Chain primitives (`Address`, `B256`, `U256`, `Bytes`) come from
//! `alloy-primitives` and are re-exported here so callers need one import.

use std::fmt;

use alloy_primitives::hex;
use serde::{Deserialize, Serialize};

pub use alloy_primitives::{Address, Bytes, B256, U256};

// =============================================================================
// Packet Identification
// =============================================================================

/// Identifier of a red packet, assigned by the contract in `PacketCreated`.
///
/// # Storage
///
/// Stored as a 32-byte BLOB primary key in the `packets` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PacketId(B256);

impl PacketId {
    /// Wraps a raw 32-byte hash.
    pub const fn new(hash: B256) -> Self {
        Self(hash)
    }

    /// Returns the underlying hash.
    pub fn as_b256(&self) -> &B256 {
        &self.0
    }

    /// Returns the id as a byte slice (for BLOB columns).
    pub fn as_slice(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl From<B256> for PacketId {
    fn from(hash: B256) -> Self {
        Self(hash)
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0))
    }
}

// =============================================================================
// Log Identification
// =============================================================================

/// Number of bytes in a [`LogId`]: a 32-byte tx hash plus a 4-byte log index.
pub const LOG_ID_LEN: usize = 36;

/// Unique identifier of one log: transaction hash followed by the log index.
///
/// # Layout
///
/// ```text
/// ┌──────────────────────────────┬──────────────────┐
/// │ transaction hash (32 bytes)  │ log index (u32   │
/// │                              │ little-endian)   │
/// └──────────────────────────────┴──────────────────┘
/// ```
///
/// The log index is appended little-endian, which is the byte layout hosted
/// subgraphs use for `hash.concatI32(logIndex)`. Ids produced here therefore
/// match the ids a subgraph deployment would assign to the same logs.
///
/// Two claims in the same transaction share the hash but never the log
/// index, so their ids differ.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogId([u8; LOG_ID_LEN]);

/// Claims are keyed by the log that produced them.
pub type ClaimId = LogId;

impl LogId {
    /// Derives the id for the log at `log_index` in transaction `tx_hash`.
    pub fn new(tx_hash: &B256, log_index: u32) -> Self {
        let mut bytes = [0u8; LOG_ID_LEN];
        bytes[..32].copy_from_slice(tx_hash.as_slice());
        bytes[32..].copy_from_slice(&log_index.to_le_bytes());
        Self(bytes)
    }

    /// Rebuilds an id from its stored bytes.
    pub const fn from_bytes(bytes: [u8; LOG_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes (for BLOB columns).
    pub fn as_bytes(&self) -> &[u8; LOG_ID_LEN] {
        &self.0
    }

    /// Returns the transaction hash part.
    pub fn tx_hash(&self) -> B256 {
        B256::from_slice(&self.0[..32])
    }

    /// Returns the log index part.
    pub fn log_index(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[32..]);
        u32::from_le_bytes(raw)
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_prefixed(self.0))
    }
}

impl fmt::Debug for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogId({})", self)
    }
}

impl Serialize for LogId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

// =============================================================================
// Split Policy
// =============================================================================

/// How a packet's value is split between its shares.
///
/// The contract enforces the split; the indexer only records which policy a
/// packet uses. On the wire this is the `uint8` enum value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketType {
    /// Every share receives `total / count`.
    Equal,
    /// Share sizes are drawn by the contract.
    Random,
}

impl PacketType {
    /// Decodes the contract's `uint8` enum value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(PacketType::Equal),
            1 => Some(PacketType::Random),
            _ => None,
        }
    }

    /// Encodes back to the contract's `uint8` enum value.
    pub fn as_u8(&self) -> u8 {
        match self {
            PacketType::Equal => 0,
            PacketType::Random => 1,
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketType::Equal => f.write_str("equal"),
            PacketType::Random => f.write_str("random"),
        }
    }
}

// =============================================================================
// Block Metadata
// =============================================================================

/// Metadata the indexing host attaches to every log.
///
/// None of this is part of the event payload; it describes where the log sits
/// in the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BlockMeta {
    /// Block height.
    pub block_number: u64,
    /// Block time in seconds since the Unix epoch.
    pub block_timestamp: u64,
    /// Hash of the transaction that emitted the log.
    pub tx_hash: B256,
    /// Position of the log within its block.
    pub log_index: u32,
}

impl BlockMeta {
    /// The id of the log this metadata describes.
    pub fn log_id(&self) -> LogId {
        LogId::new(&self.tx_hash, self.log_index)
    }
}

/// A position in the chain's log order.
///
/// Ordering is lexicographic: block first, then log index. The indexer's
/// checkpoint is the cursor of the last applied log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cursor {
    /// Block height.
    pub block_number: u64,
    /// Log index within the block.
    pub log_index: u64,
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block_number, self.log_index)
    }
}

// =============================================================================
// Tests
// =============================================================================
