//! # Projection Engine
//!
//! Folds `PacketCreated` / `PacketClaimed` events into entity-store
//! mutations. This is the only module with real invariants; everything else
//! in the crate moves bytes in and out of it.
//!
//! ## Handlers
//!
//! ```text
//! PacketCreated ──► on_packet_created ──► Packet (insert once)
//!
//! PacketClaimed ──► on_packet_claimed ──► Packet (debit) + Claim (insert once)
//! ```
//!
//! Both handlers are free functions of `(store, event)`. They keep no state
//! between calls and never retry; a store error is returned to the caller
//! untouched.
//!
//! ## Anomaly Policy
//!
//! | Input | Effect | Outcome |
//! |-------|--------|---------|
//! | create for an existing id | nothing changes | `DuplicateCreate` |
//! | claim for an unknown id | nothing changes | `OrphanClaim` |
//! | claim log already applied | nothing changes | `DuplicateClaim` |
//! | claim larger than the remaining amount | amount clamped to 0, claim kept | `Claimed` with shortfall |
//! | claim on an exhausted packet | count stays 0, claim kept | `Claimed` with `count_exhausted` |
//!
//! Every anomaly is logged at `warn` and appended to the store's anomaly log.
//! None of them is an error: one bad event must not stop the stream.
//!
//! ## Invariants
//!
//! For every packet, at every point:
//! - `remaining_amount <= total_amount`, `remaining_count <= count`
//! - both only decrease
//! - `remaining_count` reaches 0 only after exactly `count` applied claims
//!
//! Under re-delivery these hold because creation is first-write-wins and
//! claims are keyed by their log id.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{ChainEvent, PacketClaimedEvent, PacketCreatedEvent};
use crate::model::{
    Anomaly, AnomalyKind, Claim, Debit, Packet, PacketClaimedRecord, PacketCreatedRecord,
};
use crate::store::EntityStore;

// =============================================================================
// Outcome
// =============================================================================

/// What a handler did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A new packet was inserted.
    Created,
    /// The packet already existed; nothing changed.
    DuplicateCreate,
    /// The packet was debited and a claim inserted.
    Claimed {
        /// Whether either balance had to be clamped.
        debit: Debit,
    },
    /// This claim log was applied before; nothing changed.
    DuplicateClaim,
    /// The referenced packet does not exist; nothing changed.
    OrphanClaim,
}

// =============================================================================
// Handlers
// =============================================================================

/// Projects a `PacketCreated` event.
///
/// Inserts the packet with `remaining_amount = total_amount` and
/// `remaining_count = count`. If the id is already present the packet is left
/// alone, so a redelivered creation can never reset balances that claims have
/// already debited.
pub fn on_packet_created<S>(store: &mut S, event: &PacketCreatedEvent) -> Result<Outcome>
where
    S: EntityStore + ?Sized,
{
    store.save_created_record(&PacketCreatedRecord::from(event))?;

    if let Some(existing) = store.load_packet(&event.id)? {
        warn!(
            packet_id = %event.id,
            tx_hash = %event.block.tx_hash,
            log_index = event.block.log_index,
            remaining_count = existing.remaining_count,
            "duplicate PacketCreated ignored"
        );
        store.record_anomaly(&Anomaly::for_event(
            AnomalyKind::DuplicateCreate,
            event.id,
            &event.block,
            format!(
                "packet already exists with {}/{} shares remaining",
                existing.remaining_count, existing.count
            ),
        ))?;
        return Ok(Outcome::DuplicateCreate);
    }

    let packet = Packet::from_created(event);
    store.save_packet(&packet)?;

    debug!(
        packet_id = %packet.id,
        creator = %packet.creator,
        total_amount = %packet.total_amount,
        count = packet.count,
        packet_type = %packet.packet_type,
        "packet created"
    );

    Ok(Outcome::Created)
}

/// Projects a `PacketClaimed` event.
///
/// Debits one share of `amount` from the packet and inserts a [`Claim`] keyed
/// by the log's `(tx_hash, log_index)`. Unknown packets and already-applied
/// logs are skipped. Balances clamp at zero instead of wrapping.
pub fn on_packet_claimed<S>(store: &mut S, event: &PacketClaimedEvent) -> Result<Outcome>
where
    S: EntityStore + ?Sized,
{
    store.save_claimed_record(&PacketClaimedRecord::from(event))?;

    let Some(mut packet) = store.load_packet(&event.id)? else {
        warn!(
            packet_id = %event.id,
            tx_hash = %event.block.tx_hash,
            log_index = event.block.log_index,
            "PacketClaimed for unknown packet skipped"
        );
        store.record_anomaly(&Anomaly::for_event(
            AnomalyKind::OrphanClaim,
            event.id,
            &event.block,
            format!("claim of {} by {} before any creation", event.amount, event.claimer),
        ))?;
        return Ok(Outcome::OrphanClaim);
    };

    let claim = Claim::from_claimed(event);
    if store.load_claim(&claim.id)?.is_some() {
        warn!(
            packet_id = %event.id,
            claim_id = %claim.id,
            "PacketClaimed already applied"
        );
        store.record_anomaly(&Anomaly::for_event(
            AnomalyKind::DuplicateClaim,
            event.id,
            &event.block,
            "claim log already applied",
        ))?;
        return Ok(Outcome::DuplicateClaim);
    }

    let remaining_before = packet.remaining_amount;
    let debit = packet.apply_claim(event.amount);

    if let Some(shortfall) = debit.amount_shortfall {
        warn!(
            packet_id = %event.id,
            claim_id = %claim.id,
            amount = %event.amount,
            remaining = %remaining_before,
            "claim exceeds remaining amount, clamped to zero"
        );
        store.record_anomaly(&Anomaly::for_event(
            AnomalyKind::AmountUnderflow,
            event.id,
            &event.block,
            format!(
                "claimed {} with {} remaining (short by {})",
                event.amount, remaining_before, shortfall
            ),
        ))?;
    }

    if debit.count_exhausted {
        warn!(
            packet_id = %event.id,
            claim_id = %claim.id,
            count = packet.count,
            "claim against exhausted packet"
        );
        store.record_anomaly(&Anomaly::for_event(
            AnomalyKind::CountUnderflow,
            event.id,
            &event.block,
            format!("all {} shares already claimed", packet.count),
        ))?;
    }

    store.save_packet(&packet)?;
    store.save_claim(&claim)?;

    debug!(
        packet_id = %packet.id,
        claim_id = %claim.id,
        claimer = %claim.claimer,
        amount = %claim.amount,
        remaining_count = packet.remaining_count,
        "claim recorded"
    );

    Ok(Outcome::Claimed { debit })
}

/// Dispatches a decoded event to its handler.
pub fn apply<S>(store: &mut S, event: &ChainEvent) -> Result<Outcome>
where
    S: EntityStore + ?Sized,
{
    match event {
        ChainEvent::Created(e) => on_packet_created(store, e),
        ChainEvent::Claimed(e) => on_packet_claimed(store, e),
    }
}

// =============================================================================
// Counters
// =============================================================================

/// Running counters over everything the projection has seen.
///
/// Handlers stay stateless; whoever drives them (the indexer, a test) owns
/// one of these and feeds it every [`Outcome`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProjectionStats {
    pub packets_created: u64,
    pub duplicate_creates: u64,
    pub claims_recorded: u64,
    pub duplicate_claims: u64,
    pub orphan_claims: u64,
    pub amount_underflows: u64,
    pub count_underflows: u64,
    /// Logs with a known signature but an invalid payload.
    pub decode_failures: u64,
    /// Logs from other contracts or with other signatures.
    pub ignored: u64,
    /// Logs at or before the checkpoint.
    pub stale_logs: u64,
}

impl ProjectionStats {
    pub fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Created => self.packets_created += 1,
            Outcome::DuplicateCreate => self.duplicate_creates += 1,
            Outcome::Claimed { debit } => {
                self.claims_recorded += 1;
                if debit.amount_shortfall.is_some() {
                    self.amount_underflows += 1;
                }
                if debit.count_exhausted {
                    self.count_underflows += 1;
                }
            }
            Outcome::DuplicateClaim => self.duplicate_claims += 1,
            Outcome::OrphanClaim => self.orphan_claims += 1,
        }
    }

    /// Adds another set of counters into this one.
    pub fn merge(&mut self, other: &ProjectionStats) {
        self.packets_created += other.packets_created;
        self.duplicate_creates += other.duplicate_creates;
        self.claims_recorded += other.claims_recorded;
        self.duplicate_claims += other.duplicate_claims;
        self.orphan_claims += other.orphan_claims;
        self.amount_underflows += other.amount_underflows;
        self.count_underflows += other.count_underflows;
        self.decode_failures += other.decode_failures;
        self.ignored += other.ignored;
        self.stale_logs += other.stale_logs;
    }

    /// Number of flagged inputs of any kind.
    pub fn anomalies(&self) -> u64 {
        self.duplicate_creates
            + self.duplicate_claims
            + self.orphan_claims
            + self.amount_underflows
            + self.count_underflows
            + self.decode_failures
    }
}

// =============================================================================
// Tests
// =============================================================================
