//! # Contract Events and Log Decoding
//!
//! This module turns raw logs, as delivered by a node or an indexing host,
//! into validated domain events.
//!
//! ## Pipeline
//!
//! ```text
//! RawLog (JSON)           ChainEvent
//! ┌──────────────┐        ┌─────────────────────┐
//! │ address      │        │ Created {           │
//! │ topics[0..3] │ decode │   id, creator, ...  │
//! │ data         │ ─────► │   block: BlockMeta  │
//! │ block/tx/idx │        │ }                   │
//! └──────────────┘        │ Claimed { ... }     │
//!                         └─────────────────────┘
//! ```
//!
//! `topics[0]` selects the event. Logs with any other signature are not ours
//! and decode to `None`. Logs with our signature but a bad payload are a
//! [`Error::Decode`].
//!
//! ## ABI
//!
//! The event definitions are generated by `alloy-sol-types`' `sol!` macro from
//! the contract's Solidity signatures, which gives us the topic hashes and an
//! ABI decoder that validates padding.

use alloy_sol_types::{sol, SolEvent};
use serde::{Deserialize, Serialize};

use crate::codec::MAX_SQL_INTEGER;
use crate::error::{Error, Result};
use crate::types::{Address, BlockMeta, Bytes, Cursor, PacketId, PacketType, B256, U256};

/// Solidity-level event definitions of the RedPacket contract.
pub mod abi {
    use super::sol;

    sol! {
        /// Emitted by `createPacket(count, packetType) payable`.
        event PacketCreated(
            bytes32 indexed id,
            address indexed creator,
            uint256 totalAmount,
            uint256 count,
            uint8 packetType
        );

        /// Emitted by `claimPacket(id)`.
        event PacketClaimed(
            bytes32 indexed id,
            address indexed claimer,
            uint256 amount
        );
    }
}

// =============================================================================
// Raw Log Wire Format
// =============================================================================

/// One log as delivered by the event source.
///
/// Field names follow the JSON-RPC log object, so `eth_getLogs` output (with
/// the block timestamp joined in) can be fed to the indexer directly:
///
/// ```json
/// {"address":"0x…","topics":["0x…"],"data":"0x…","blockNumber":12,
///  "blockTimestamp":1700000000,"transactionHash":"0x…","logIndex":3}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLog {
    /// Contract that emitted the log.
    pub address: Address,
    /// Indexed topics; `topics[0]` is the event signature hash.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed parameters.
    pub data: Bytes,
    /// Block height.
    pub block_number: u64,
    /// Block time in seconds.
    pub block_timestamp: u64,
    /// Hash of the emitting transaction.
    pub transaction_hash: B256,
    /// Position of the log within its block.
    pub log_index: u64,
}

impl RawLog {
    /// Encodes a `PacketCreated` log, as the contract would emit it.
    pub fn packet_created(address: Address, event: &PacketCreatedEvent) -> Self {
        let log = abi::PacketCreated {
            id: *event.id.as_b256(),
            creator: event.creator,
            totalAmount: event.total_amount,
            count: U256::from(event.count),
            packetType: event.packet_type.as_u8(),
        }
        .encode_log_data();

        Self::from_parts(address, log.topics().to_vec(), log.data, &event.block)
    }

    /// Encodes a `PacketClaimed` log, as the contract would emit it.
    pub fn packet_claimed(address: Address, event: &PacketClaimedEvent) -> Self {
        let log = abi::PacketClaimed {
            id: *event.id.as_b256(),
            claimer: event.claimer,
            amount: event.amount,
        }
        .encode_log_data();

        Self::from_parts(address, log.topics().to_vec(), log.data, &event.block)
    }

    fn from_parts(address: Address, topics: Vec<B256>, data: Bytes, block: &BlockMeta) -> Self {
        Self {
            address,
            topics,
            data,
            block_number: block.block_number,
            block_timestamp: block.block_timestamp,
            transaction_hash: block.tx_hash,
            log_index: u64::from(block.log_index),
        }
    }

    /// The `(block, log_index)` position of this log.
    pub fn cursor(&self) -> Cursor {
        Cursor {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    fn decode_error(&self, reason: impl Into<String>) -> Error {
        Error::Decode {
            tx_hash: self.transaction_hash.to_string(),
            log_index: self.log_index,
            reason: reason.into(),
        }
    }

    /// Whether this log's position can be written as a checkpoint.
    pub fn has_storable_cursor(&self) -> bool {
        self.block_number <= MAX_SQL_INTEGER && self.log_index <= MAX_SQL_INTEGER
    }

    /// Validates the host-supplied metadata.
    fn block_meta(&self) -> Result<BlockMeta> {
        let log_index = u32::try_from(self.log_index)
            .map_err(|_| self.decode_error(format!("logIndex {} exceeds u32", self.log_index)))?;
        if self.block_number > MAX_SQL_INTEGER {
            return Err(self.decode_error(format!("blockNumber {} exceeds i64", self.block_number)));
        }
        if self.block_timestamp > MAX_SQL_INTEGER {
            return Err(self.decode_error(format!(
                "blockTimestamp {} exceeds i64",
                self.block_timestamp
            )));
        }

        Ok(BlockMeta {
            block_number: self.block_number,
            block_timestamp: self.block_timestamp,
            tx_hash: self.transaction_hash,
            log_index,
        })
    }
}

// =============================================================================
// Domain Events
// =============================================================================

/// A validated `PacketCreated` event plus its block metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketCreatedEvent {
    pub id: PacketId,
    pub creator: Address,
    pub total_amount: U256,
    pub count: u64,
    pub packet_type: PacketType,
    pub block: BlockMeta,
}

/// A validated `PacketClaimed` event plus its block metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketClaimedEvent {
    pub id: PacketId,
    pub claimer: Address,
    pub amount: U256,
    pub block: BlockMeta,
}

/// Either of the two events the projection understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainEvent {
    Created(PacketCreatedEvent),
    Claimed(PacketClaimedEvent),
}

// =============================================================================
// Decoding
// =============================================================================

/// Decodes one raw log.
///
/// # Returns
///
/// - `Ok(Some(event))` for a well-formed `PacketCreated` / `PacketClaimed`
/// - `Ok(None)` when `topics[0]` is some other event (or absent)
/// - `Err(Error::Decode)` when the signature matches but the payload is invalid
///
/// The contract guarantees `totalAmount > 0` and `count > 0`; those are not
/// re-checked here.
pub fn decode_log(log: &RawLog) -> Result<Option<ChainEvent>> {
    let Some(signature) = log.topics.first() else {
        return Ok(None);
    };

    if *signature == abi::PacketCreated::SIGNATURE_HASH {
        let block = log.block_meta()?;
        let raw = abi::PacketCreated::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| log.decode_error(format!("PacketCreated: {e}")))?;

        let packet_type = PacketType::from_u8(raw.packetType).ok_or_else(|| {
            log.decode_error(format!("packetType {} is not a known split policy", raw.packetType))
        })?;
        let count = u64::try_from(raw.count)
            .ok()
            .filter(|&count| count <= MAX_SQL_INTEGER)
            .ok_or_else(|| log.decode_error(format!("count {} exceeds i64", raw.count)))?;

        return Ok(Some(ChainEvent::Created(PacketCreatedEvent {
            id: PacketId::new(raw.id),
            creator: raw.creator,
            total_amount: raw.totalAmount,
            count,
            packet_type,
            block,
        })));
    }

    if *signature == abi::PacketClaimed::SIGNATURE_HASH {
        let block = log.block_meta()?;
        let raw = abi::PacketClaimed::decode_raw_log(log.topics.iter().copied(), &log.data, true)
            .map_err(|e| log.decode_error(format!("PacketClaimed: {e}")))?;

        return Ok(Some(ChainEvent::Claimed(PacketClaimedEvent {
            id: PacketId::new(raw.id),
            claimer: raw.claimer,
            amount: raw.amount,
            block,
        })));
    }

    Ok(None)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn block(log_index: u32) -> BlockMeta {
        BlockMeta {
            block_number: 100,
            block_timestamp: 1_700_000_000,
            tx_hash: B256::repeat_byte(0xab),
            log_index,
        }
    }

    fn created() -> PacketCreatedEvent {
        PacketCreatedEvent {
            id: PacketId::new(B256::repeat_byte(0x01)),
            creator: Address::repeat_byte(0xc0),
            total_amount: U256::from(1_000u64),
            count: 4,
            packet_type: PacketType::Random,
            block: block(0),
        }
    }

    #[test]
    fn test_decode_packet_created() {
        let event = created();
        let log = RawLog::packet_created(Address::ZERO, &event);

        assert_eq!(log.topics.len(), 3);
        assert_eq!(log.topics[0], abi::PacketCreated::SIGNATURE_HASH);

        let decoded = decode_log(&log).unwrap();
        assert_eq!(decoded, Some(ChainEvent::Created(event)));
    }

    #[test]
    fn test_decode_packet_claimed() {
        let event = PacketClaimedEvent {
            id: PacketId::new(B256::repeat_byte(0x01)),
            claimer: Address::repeat_byte(0x77),
            amount: U256::from(234u64),
            block: block(5),
        };
        let log = RawLog::packet_claimed(Address::ZERO, &event);

        match decode_log(&log).unwrap() {
            Some(ChainEvent::Claimed(decoded)) => {
                assert_eq!(decoded, event);
                assert_eq!(decoded.block.log_id(), block(5).log_id());
            }
            other => panic!("expected claimed event, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_signature_is_ignored() {
        let mut log = RawLog::packet_created(Address::ZERO, &created());
        log.topics[0] = B256::repeat_byte(0xee);
        assert_eq!(decode_log(&log).unwrap(), None);

        log.topics.clear();
        assert_eq!(decode_log(&log).unwrap(), None);
    }

    #[test]
    fn test_unknown_packet_type_is_a_decode_error() {
        let raw = abi::PacketCreated {
            id: B256::repeat_byte(0x01),
            creator: Address::repeat_byte(0xc0),
            totalAmount: U256::from(10u64),
            count: U256::from(2u64),
            packetType: 7,
        }
        .encode_log_data();
        let log = RawLog::from_parts(Address::ZERO, raw.topics().to_vec(), raw.data, &block(0));

        let err = decode_log(&log).unwrap_err();
        assert!(
            matches!(err, Error::Decode { ref reason, .. } if reason.contains("packetType 7")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_oversized_count_is_a_decode_error() {
        let raw = abi::PacketCreated {
            id: B256::repeat_byte(0x01),
            creator: Address::repeat_byte(0xc0),
            totalAmount: U256::from(10u64),
            count: U256::MAX,
            packetType: 0,
        }
        .encode_log_data();
        let log = RawLog::from_parts(Address::ZERO, raw.topics().to_vec(), raw.data, &block(0));

        assert!(matches!(decode_log(&log), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_count_beyond_i64_is_a_decode_error() {
        let encode = |count: u64| {
            let mut event = created();
            event.count = count;
            RawLog::packet_created(Address::ZERO, &event)
        };

        assert!(decode_log(&encode(MAX_SQL_INTEGER)).unwrap().is_some());
        let err = decode_log(&encode(MAX_SQL_INTEGER + 1)).unwrap_err();
        assert!(
            matches!(err, Error::Decode { ref reason, .. } if reason.contains("exceeds i64")),
            "unexpected error: {err:?}"
        );
    }

    #[test]
    fn test_block_metadata_beyond_i64_is_a_decode_error() {
        let mut log = RawLog::packet_created(Address::ZERO, &created());
        log.block_number = MAX_SQL_INTEGER + 1;
        assert!(matches!(decode_log(&log), Err(Error::Decode { .. })));
        assert!(!log.has_storable_cursor());

        let mut log = RawLog::packet_created(Address::ZERO, &created());
        log.block_timestamp = u64::MAX;
        assert!(matches!(decode_log(&log), Err(Error::Decode { .. })));
        assert!(log.has_storable_cursor());
    }

    #[test]
    fn test_truncated_data_is_a_decode_error() {
        let mut log = RawLog::packet_created(Address::ZERO, &created());
        log.data = Bytes::from(vec![0u8; 10]);
        assert!(matches!(decode_log(&log), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_oversized_log_index_is_a_decode_error() {
        let mut log = RawLog::packet_created(Address::ZERO, &created());
        log.log_index = u64::from(u32::MAX) + 1;
        assert!(matches!(decode_log(&log), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_raw_log_json_round_trip() {
        let log = RawLog::packet_created(Address::repeat_byte(0x05), &created());
        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"transactionHash\""));
        assert!(json.contains("\"logIndex\":0"));

        let parsed: RawLog = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, log);
    }
}
