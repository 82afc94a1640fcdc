//! # Entity Store
//!
//! The projection reads and writes entities through the [`EntityStore`]
//! trait. It is passed into every handler call instead of being reached
//! through a global, so handlers stay pure functions of `(store, event)`.
//!
//! ## Contract
//!
//! - `load_*` returns `None` for unknown ids
//! - `save_*` is an upsert of a single entity
//! - no deletes
//! - no multi-entity atomicity is promised here; callers that need it (the
//!   SQLite indexer) wrap a batch in a transaction themselves
//!
//! Two implementations ship with the crate:
//!
//! | Store | Use |
//! |-------|-----|
//! | [`MemoryStore`] | unit tests, property checks, dry runs |
//! | [`SqliteStore`](crate::sqlite_store::SqliteStore) | durable indexing |

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::{Anomaly, Claim, Packet, PacketClaimedRecord, PacketCreatedRecord};
use crate::types::{LogId, PacketId};

/// Load/save access to the projected entities.
pub trait EntityStore {
    fn load_packet(&self, id: &PacketId) -> Result<Option<Packet>>;

    fn save_packet(&mut self, packet: &Packet) -> Result<()>;

    fn load_claim(&self, id: &LogId) -> Result<Option<Claim>>;

    fn save_claim(&mut self, claim: &Claim) -> Result<()>;

    /// Stores the raw `PacketCreated` log.
    fn save_created_record(&mut self, record: &PacketCreatedRecord) -> Result<()>;

    /// Stores the raw `PacketClaimed` log.
    fn save_claimed_record(&mut self, record: &PacketClaimedRecord) -> Result<()>;

    /// Appends a flagged input to the anomaly log.
    fn record_anomaly(&mut self, anomaly: &Anomaly) -> Result<()>;
}

// =============================================================================
// In-Memory Store
// =============================================================================

/// A `BTreeMap`-backed store.
///
/// Iteration order is by key, which keeps test assertions deterministic.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    packets: BTreeMap<PacketId, Packet>,
    claims: BTreeMap<LogId, Claim>,
    created_records: BTreeMap<LogId, PacketCreatedRecord>,
    claimed_records: BTreeMap<LogId, PacketClaimedRecord>,
    anomalies: Vec<Anomaly>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> impl Iterator<Item = &Packet> {
        self.packets.values()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.len()
    }

    pub fn claims(&self) -> impl Iterator<Item = &Claim> {
        self.claims.values()
    }

    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// Claims referencing `packet`, in id order.
    pub fn claims_for(&self, packet: &PacketId) -> Vec<&Claim> {
        self.claims.values().filter(|c| &c.packet == packet).collect()
    }

    pub fn created_records(&self) -> impl Iterator<Item = &PacketCreatedRecord> {
        self.created_records.values()
    }

    pub fn claimed_records(&self) -> impl Iterator<Item = &PacketClaimedRecord> {
        self.claimed_records.values()
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }
}

impl EntityStore for MemoryStore {
    fn load_packet(&self, id: &PacketId) -> Result<Option<Packet>> {
        Ok(self.packets.get(id).cloned())
    }

    fn save_packet(&mut self, packet: &Packet) -> Result<()> {
        self.packets.insert(packet.id, packet.clone());
        Ok(())
    }

    fn load_claim(&self, id: &LogId) -> Result<Option<Claim>> {
        Ok(self.claims.get(id).cloned())
    }

    fn save_claim(&mut self, claim: &Claim) -> Result<()> {
        self.claims.insert(claim.id, claim.clone());
        Ok(())
    }

    fn save_created_record(&mut self, record: &PacketCreatedRecord) -> Result<()> {
        self.created_records.insert(record.id, record.clone());
        Ok(())
    }

    fn save_claimed_record(&mut self, record: &PacketClaimedRecord) -> Result<()> {
        self.claimed_records.insert(record.id, record.clone());
        Ok(())
    }

    fn record_anomaly(&mut self, anomaly: &Anomaly) -> Result<()> {
        self.anomalies.push(anomaly.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Address, PacketType, B256, U256};

    #[test]
    fn test_save_is_an_upsert() {
        let mut store = MemoryStore::new();
        let mut packet = Packet {
            id: PacketId::new(B256::repeat_byte(9)),
            creator: Address::ZERO,
            total_amount: U256::from(5u64),
            remaining_amount: U256::from(5u64),
            count: 1,
            remaining_count: 1,
            packet_type: PacketType::Equal,
            timestamp: 1,
        };
        store.save_packet(&packet).unwrap();

        packet.remaining_count = 0;
        store.save_packet(&packet).unwrap();

        assert_eq!(store.packet_count(), 1);
        let loaded = store.load_packet(&packet.id).unwrap().unwrap();
        assert_eq!(loaded.remaining_count, 0);
    }

    #[test]
    fn test_unknown_ids_load_as_none() {
        let store = MemoryStore::new();
        assert!(store
            .load_packet(&PacketId::new(B256::ZERO))
            .unwrap()
            .is_none());
        assert!(store
            .load_claim(&LogId::new(&B256::ZERO, 0))
            .unwrap()
            .is_none());
    }
}
