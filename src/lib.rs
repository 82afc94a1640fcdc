//! # Red Packet Indexer
//!
//! An event-sourced read model for the RedPacket contract. Every red packet
//! is funded by one `PacketCreated` log and drained by `PacketClaimed` logs;
//! this crate folds those logs into queryable `Packet` and `Claim` entities.
//!
//! - **Deterministic projection**: the same ordered logs always produce the
//!   same entities
//! - **Crash-safe indexing**: entities and checkpoint commit in one SQLite
//!   transaction
//! - **Tolerant of bad input**: duplicates, orphans and underflows are
//!   flagged, never fatal
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Raw logs (JSON / eth_getLogs)                │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │ events::decode_log
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Indexer Actor                              │
//! │             (single thread, owns write connection)              │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────────┐  ┌─────────────────────┐ │
//! │  │ Chunking +  │  │   projection    │  │  SqliteStore        │ │
//! │  │ checkpoint  │  │ on_packet_*     │  │  (LRU packet cache) │ │
//! │  └─────────────┘  └─────────────────┘  └─────────────────────┘ │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    SQLite (WAL)  ◄──── query::*                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **Bounded balances**: `remaining_amount <= total_amount` and
//!    `remaining_count <= count`, and both only decrease
//! 2. **First creation wins**: a repeated `PacketCreated` never resets a packet
//! 3. **No orphans**: a claim is only stored if its packet exists
//! 4. **One debit per log**: a `PacketClaimed` log is applied at most once
//! 5. **Memory never leads disk**: caches and checkpoints advance after commit
//!
//! ## Module Organization
//!
//! - [`error`]: the crate's error type
//! - [`types`]: ids, split policy, block metadata
//! - [`events`]: ABI definitions and log decoding
//! - [`model`]: entities and anomaly records
//! - [`store`]: the `EntityStore` trait and an in-memory store
//! - [`projection`]: the event handlers
//! - [`schema`], [`codec`], [`sqlite_store`]: durable storage
//! - [`indexer`]: the single-writer actor
//! - [`query`]: read model queries
//! - [`config`]: TOML configuration
//!
//! ## Example
//!
//! ```rust
//! use redpacket_indexer::{apply, decode_log, MemoryStore, RawLog};
//! # use redpacket_indexer::events::PacketCreatedEvent;
//! # use redpacket_indexer::types::{Address, BlockMeta, PacketId, PacketType, B256, U256};
//! # let event = PacketCreatedEvent {
//! #     id: PacketId::new(B256::repeat_byte(1)),
//! #     creator: Address::ZERO,
//! #     total_amount: U256::from(100u64),
//! #     count: 2,
//! #     packet_type: PacketType::Equal,
//! #     block: BlockMeta { block_number: 1, block_timestamp: 1, tx_hash: B256::ZERO, log_index: 0 },
//! # };
//! # let log = RawLog::packet_created(Address::ZERO, &event);
//!
//! let mut store = MemoryStore::new();
//! if let Some(event) = decode_log(&log)? {
//!     apply(&mut store, &event)?;
//! }
//! assert_eq!(store.packet_count(), 1);
//! # Ok::<(), redpacket_indexer::Error>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

/// Error types for indexer operations.
///
/// A single enum covers store, decode, setup and lifecycle failures.
/// Projection anomalies are not errors.
pub mod error;

/// Domain types: packet ids, log ids, split policy, block metadata.
///
/// Re-exports the `alloy-primitives` chain types used throughout the crate.
pub mod types;

/// Contract event definitions and raw log decoding.
pub mod events;

/// Entities maintained by the projection.
pub mod model;

/// Storage abstraction used by the projection handlers.
pub mod store;

/// Event handlers that fold decoded events into entities.
///
/// Pure functions of `(store, event)`; see [`projection::apply`].
pub mod projection;

/// SQLite schema definitions and database initialization.
pub mod schema;

/// Column encoding for chain values.
pub mod codec;

/// `EntityStore` over SQLite with an LRU packet cache.
pub mod sqlite_store;

/// Single-writer indexer actor.
///
/// Sorts logs into chain order, applies them in chunks and commits each
/// chunk together with the checkpoint.
pub mod indexer;

/// Read model queries over an indexed database.
pub mod query;

/// Indexer configuration loaded from TOML.
pub mod config;

// =============================================================================
// Re-exports
// =============================================================================
// Re-export the types callers touch most so they can write
// `use redpacket_indexer::{Database, spawn_indexer}`.

pub use config::IndexerConfig;
pub use error::{Error, Result};
pub use events::{decode_log, ChainEvent, RawLog};
pub use indexer::{spawn_indexer, BatchReport, IndexerHandle};
pub use model::{Anomaly, AnomalyKind, Claim, Packet, PacketStatus};
pub use projection::{apply, on_packet_claimed, on_packet_created, Outcome, ProjectionStats};
pub use schema::Database;
pub use sqlite_store::SqliteStore;
pub use store::{EntityStore, MemoryStore};
pub use types::{ClaimId, Cursor, LogId, PacketId, PacketType};
