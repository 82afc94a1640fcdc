//! # Entities
//!
//! The rows the projection maintains:
//!
//! | Entity | Key | Mutability |
//! |--------|-----|------------|
//! | [`Packet`] | packet id | balances decrease, everything else fixed |
//! | [`Claim`] | log id | immutable |
//! | [`PacketCreatedRecord`] | log id | immutable raw event |
//! | [`PacketClaimedRecord`] | log id | immutable raw event |
//! | [`Anomaly`] | insertion order | append-only |
//!
//! ## Packet Invariants
//!
//! - `remaining_amount <= total_amount`
//! - `remaining_count <= count`
//! - both only ever decrease
//!
//! `remaining_count == 0` does not imply `remaining_amount == 0`: a random
//! split can leave dust behind.

use serde::Serialize;

use crate::events::{PacketClaimedEvent, PacketCreatedEvent};
use crate::types::{Address, BlockMeta, LogId, PacketId, PacketType, B256, U256};

// =============================================================================
// Packet
// =============================================================================

/// One red-packet distribution campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Packet {
    pub id: PacketId,
    pub creator: Address,
    pub total_amount: U256,
    pub remaining_amount: U256,
    pub count: u64,
    pub remaining_count: u64,
    pub packet_type: PacketType,
    /// Creation block time, seconds.
    pub timestamp: u64,
}

/// Where a packet is in its lifecycle.
///
/// ```text
/// NonExistent ──create──► Active ──claim──► … ──claim──► Exhausted
/// ```
///
/// Transitions only move forward. `NonExistent` is represented by the packet
/// being absent from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PacketStatus {
    Active,
    Exhausted,
}

/// What applying one claim did to a packet's balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Debit {
    /// How much the claim exceeded `remaining_amount`, if it did.
    pub amount_shortfall: Option<U256>,
    /// The packet had no shares left when the claim arrived.
    pub count_exhausted: bool,
}

impl Debit {
    /// True if either balance had to be clamped.
    pub fn is_clamped(&self) -> bool {
        self.amount_shortfall.is_some() || self.count_exhausted
    }
}

impl Packet {
    /// A fresh packet with its full balance remaining.
    pub fn from_created(event: &PacketCreatedEvent) -> Self {
        Self {
            id: event.id,
            creator: event.creator,
            total_amount: event.total_amount,
            remaining_amount: event.total_amount,
            count: event.count,
            remaining_count: event.count,
            packet_type: event.packet_type,
            timestamp: event.block.block_timestamp,
        }
    }

    pub fn status(&self) -> PacketStatus {
        if self.remaining_count == 0 {
            PacketStatus::Exhausted
        } else {
            PacketStatus::Active
        }
    }

    /// Number of shares handed out so far.
    pub fn claimed_count(&self) -> u64 {
        self.count.saturating_sub(self.remaining_count)
    }

    /// Value handed out so far.
    pub fn claimed_amount(&self) -> U256 {
        self.total_amount.saturating_sub(self.remaining_amount)
    }

    /// Debits one share of `amount`, clamping both balances at zero.
    ///
    /// The contract makes underflow impossible for well-ordered input; a
    /// clamp here means the event stream and the store disagree. The caller
    /// decides how to report it via the returned [`Debit`].
    pub fn apply_claim(&mut self, amount: U256) -> Debit {
        let mut debit = Debit::default();

        match self.remaining_amount.checked_sub(amount) {
            Some(rest) => self.remaining_amount = rest,
            None => {
                debit.amount_shortfall = Some(amount - self.remaining_amount);
                self.remaining_amount = U256::ZERO;
            }
        }

        match self.remaining_count.checked_sub(1) {
            Some(rest) => self.remaining_count = rest,
            None => debit.count_exhausted = true,
        }

        debit
    }
}

// =============================================================================
// Claim
// =============================================================================

/// One share withdrawn from a packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    /// `(tx_hash, log_index)` of the `PacketClaimed` log.
    pub id: LogId,
    /// Back-reference to the owning packet.
    pub packet: PacketId,
    pub claimer: Address,
    pub amount: U256,
    /// Claim block time, seconds.
    pub timestamp: u64,
}

impl Claim {
    pub fn from_claimed(event: &PacketClaimedEvent) -> Self {
        Self {
            id: event.block.log_id(),
            packet: event.id,
            claimer: event.claimer,
            amount: event.amount,
            timestamp: event.block.block_timestamp,
        }
    }
}

// =============================================================================
// Raw Event Records
// =============================================================================

/// Verbatim copy of a `PacketCreated` log, kept as an audit trail.
///
/// Written for every decoded creation log, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketCreatedRecord {
    pub id: LogId,
    pub packet_id: PacketId,
    pub creator: Address,
    pub total_amount: U256,
    pub count: u64,
    pub packet_type: PacketType,
    pub block: BlockMeta,
}

impl From<&PacketCreatedEvent> for PacketCreatedRecord {
    fn from(event: &PacketCreatedEvent) -> Self {
        Self {
            id: event.block.log_id(),
            packet_id: event.id,
            creator: event.creator,
            total_amount: event.total_amount,
            count: event.count,
            packet_type: event.packet_type,
            block: event.block,
        }
    }
}

/// Verbatim copy of a `PacketClaimed` log, kept as an audit trail.
///
/// Written for every decoded claim log, orphans included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PacketClaimedRecord {
    pub id: LogId,
    pub packet_id: PacketId,
    pub claimer: Address,
    pub amount: U256,
    pub block: BlockMeta,
}

impl From<&PacketClaimedEvent> for PacketClaimedRecord {
    fn from(event: &PacketClaimedEvent) -> Self {
        Self {
            id: event.block.log_id(),
            packet_id: event.id,
            claimer: event.claimer,
            amount: event.amount,
            block: event.block,
        }
    }
}

// =============================================================================
// Anomalies
// =============================================================================

/// Kinds of input the projection tolerates but flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// `PacketCreated` for an id that already exists.
    DuplicateCreate,
    /// `PacketClaimed` for an id that does not exist.
    OrphanClaim,
    /// Claim amount larger than `remaining_amount`.
    AmountUnderflow,
    /// Claim against a packet with `remaining_count == 0`.
    CountUnderflow,
    /// `PacketClaimed` log applied before.
    DuplicateClaim,
    /// Log with a known signature but an invalid payload.
    DecodeFailure,
}

impl AnomalyKind {
    /// Stable name used in the `anomalies` table.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::DuplicateCreate => "duplicate_create",
            AnomalyKind::OrphanClaim => "orphan_claim",
            AnomalyKind::AmountUnderflow => "amount_underflow",
            AnomalyKind::CountUnderflow => "count_underflow",
            AnomalyKind::DuplicateClaim => "duplicate_claim",
            AnomalyKind::DecodeFailure => "decode_failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "duplicate_create" => Some(AnomalyKind::DuplicateCreate),
            "orphan_claim" => Some(AnomalyKind::OrphanClaim),
            "amount_underflow" => Some(AnomalyKind::AmountUnderflow),
            "count_underflow" => Some(AnomalyKind::CountUnderflow),
            "duplicate_claim" => Some(AnomalyKind::DuplicateClaim),
            "decode_failure" => Some(AnomalyKind::DecodeFailure),
            _ => None,
        }
    }
}

/// A flagged input, persisted so ordering problems stay visible after the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub kind: AnomalyKind,
    /// Absent for logs that could not be decoded.
    pub packet_id: Option<PacketId>,
    pub tx_hash: B256,
    pub log_index: u64,
    pub block_number: u64,
    pub detail: String,
}

impl Anomaly {
    /// An anomaly raised while projecting a decoded event.
    pub fn for_event(
        kind: AnomalyKind,
        packet_id: PacketId,
        block: &BlockMeta,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            packet_id: Some(packet_id),
            tx_hash: block.tx_hash,
            log_index: u64::from(block.log_index),
            block_number: block.block_number,
            detail: detail.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(total: u64, count: u64) -> Packet {
        Packet {
            id: PacketId::new(B256::repeat_byte(1)),
            creator: Address::repeat_byte(2),
            total_amount: U256::from(total),
            remaining_amount: U256::from(total),
            count,
            remaining_count: count,
            packet_type: PacketType::Equal,
            timestamp: 0,
        }
    }

    #[test]
    fn test_apply_claim_debits_both_balances() {
        let mut p = packet(100, 4);
        let debit = p.apply_claim(U256::from(25u64));

        assert!(!debit.is_clamped());
        assert_eq!(p.remaining_amount, U256::from(75u64));
        assert_eq!(p.remaining_count, 3);
        assert_eq!(p.claimed_count(), 1);
        assert_eq!(p.claimed_amount(), U256::from(25u64));
        assert_eq!(p.status(), PacketStatus::Active);
    }

    #[test]
    fn test_apply_claim_clamps_amount_at_zero() {
        let mut p = packet(10, 2);
        let debit = p.apply_claim(U256::from(15u64));

        assert_eq!(debit.amount_shortfall, Some(U256::from(5u64)));
        assert!(!debit.count_exhausted);
        assert_eq!(p.remaining_amount, U256::ZERO);
        assert_eq!(p.remaining_count, 1);
    }

    #[test]
    fn test_apply_claim_on_exhausted_packet_keeps_count_at_zero() {
        let mut p = packet(10, 1);
        p.apply_claim(U256::from(10u64));
        assert_eq!(p.status(), PacketStatus::Exhausted);

        let debit = p.apply_claim(U256::from(1u64));
        assert!(debit.count_exhausted);
        assert_eq!(p.remaining_count, 0);
        assert_eq!(p.remaining_amount, U256::ZERO);
    }

    #[test]
    fn test_exhausted_with_dust_left() {
        let mut p = packet(100, 2);
        p.apply_claim(U256::from(60u64));
        p.apply_claim(U256::from(39u64));

        assert_eq!(p.status(), PacketStatus::Exhausted);
        assert_eq!(p.remaining_amount, U256::from(1u64));
    }

    #[test]
    fn test_anomaly_kind_names_round_trip() {
        for kind in [
            AnomalyKind::DuplicateCreate,
            AnomalyKind::OrphanClaim,
            AnomalyKind::AmountUnderflow,
            AnomalyKind::CountUnderflow,
            AnomalyKind::DuplicateClaim,
            AnomalyKind::DecodeFailure,
        ] {
            assert_eq!(AnomalyKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(AnomalyKind::parse("nope"), None);
    }
}
