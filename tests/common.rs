#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use redpacket_indexer::events::{PacketClaimedEvent, PacketCreatedEvent};
use redpacket_indexer::types::{Address, BlockMeta, PacketId, PacketType, B256, U256};
use redpacket_indexer::{Database, RawLog, SqliteStore};

pub fn contract() -> Address {
    Address::repeat_byte(0x5f)
}

pub fn packet_id(n: u8) -> PacketId {
    PacketId::new(B256::repeat_byte(n))
}

pub fn user(n: u8) -> Address {
    Address::repeat_byte(n)
}

pub fn create_temp_db_file(name: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::TempDir::new().expect("create temp dir");
    let path = dir.path().join(name);
    let _ = Database::open(&path).expect("initialize database");
    (dir, path)
}

pub fn open_reader(path: &Path) -> Connection {
    redpacket_indexer::query::open_reader(path).expect("open read-only connection")
}

pub fn open_read_write(path: &Path) -> Connection {
    Connection::open(path).expect("open read-write connection")
}

pub fn sqlite_store() -> SqliteStore {
    SqliteStore::new(Database::open_in_memory().expect("open db"), 64).expect("create store")
}

/// Emits events at increasing chain positions, one transaction per log unless
/// told otherwise.
pub struct Chain {
    block_number: u64,
    log_index: u32,
    tx_counter: u64,
    tx_hash: B256,
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}

impl Chain {
    pub fn new() -> Self {
        Self {
            block_number: 100,
            log_index: 0,
            tx_counter: 0,
            tx_hash: B256::ZERO,
        }
    }

    /// Moves to the next block.
    pub fn mine(&mut self) -> &mut Self {
        self.block_number += 1;
        self.log_index = 0;
        self
    }

    /// Position for a log in a fresh transaction.
    pub fn next(&mut self) -> BlockMeta {
        self.tx_counter += 1;
        let mut tx_hash = B256::ZERO;
        tx_hash.0[24..].copy_from_slice(&self.tx_counter.to_be_bytes());
        self.tx_hash = tx_hash;
        self.same_tx()
    }

    /// Position for another log in the current transaction.
    pub fn same_tx(&mut self) -> BlockMeta {
        let meta = BlockMeta {
            block_number: self.block_number,
            block_timestamp: 1_700_000_000 + self.block_number * 12,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        };
        self.log_index += 1;
        meta
    }

    pub fn create(
        &mut self,
        id: PacketId,
        total: u64,
        count: u64,
        packet_type: PacketType,
    ) -> PacketCreatedEvent {
        PacketCreatedEvent {
            id,
            creator: user(0xc0),
            total_amount: U256::from(total),
            count,
            packet_type,
            block: self.next(),
        }
    }

    pub fn claim(&mut self, id: PacketId, claimer: Address, amount: u64) -> PacketClaimedEvent {
        PacketClaimedEvent {
            id,
            claimer,
            amount: U256::from(amount),
            block: self.next(),
        }
    }

    /// A claim emitted by the same transaction as the previous log.
    pub fn claim_in_same_tx(
        &mut self,
        id: PacketId,
        claimer: Address,
        amount: u64,
    ) -> PacketClaimedEvent {
        PacketClaimedEvent {
            id,
            claimer,
            amount: U256::from(amount),
            block: self.same_tx(),
        }
    }
}

pub fn created_log(event: &PacketCreatedEvent) -> RawLog {
    RawLog::packet_created(contract(), event)
}

pub fn claimed_log(event: &PacketClaimedEvent) -> RawLog {
    RawLog::packet_claimed(contract(), event)
}
