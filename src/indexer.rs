//! # Single-Writer Indexer
//!
//! This module drives the projection from raw logs to committed SQLite state.
//! One actor owns the only write connection, so every packet's events are
//! applied strictly one after another without any locking.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   mpsc    ┌──────────────────────────────────────────┐
//! │ IndexerHandle│ ────────► │ indexer thread (current-thread runtime)  │
//! │  (clonable)  │ ◄──────── │                                          │
//! └──────────────┘  oneshot  │  sort by (block, log_index)              │
//!                            │  for each chunk of batch_max_size:       │
//!                            │    BEGIN IMMEDIATE                       │
//!                            │      skip stale / foreign logs           │
//!                            │      decode → projection::apply          │
//!                            │      UPSERT checkpoint                   │
//!                            │    COMMIT   (or ROLLBACK + clear cache)  │
//!                            └──────────────────────────────────────────┘
//! ```
//!
//! ## Checkpoint
//!
//! The checkpoint is the cursor of the last log the indexer consumed,
//! whatever that log turned out to be (applied, ignored, undecodable). It is
//! written in the same transaction as the entities, so after a crash the
//! database is either before or after a chunk, never in between. Logs at or
//! before the checkpoint are counted as `stale_logs` and skipped, which makes
//! replaying an overlapping range after a restart safe.
//!
//! A log whose block number or log index does not fit an INTEGER column is
//! recorded as a decode failure but never becomes the checkpoint.
//!
//! ## Invariants
//!
//! - Memory never leads disk: the in-memory checkpoint and counters advance
//!   only after `COMMIT` succeeds
//! - A failed chunk leaves no trace in the database or the packet cache
//! - Chunks already committed by the same `submit` call stay committed

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use crate::events::{decode_log, RawLog};
use crate::model::{Anomaly, AnomalyKind};
use crate::projection::{self, ProjectionStats};
use crate::schema::Database;
use crate::sqlite_store::SqliteStore;
use crate::store::EntityStore;
use crate::types::Cursor;

// =============================================================================
// Reports
// =============================================================================

/// Result of one [`IndexerHandle::submit`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BatchReport {
    /// Logs handed to `submit`.
    pub received: usize,
    /// SQLite transactions committed.
    pub chunks: usize,
    /// Counters for this submission only.
    pub stats: ProjectionStats,
    /// Checkpoint after the last committed chunk.
    pub checkpoint: Option<Cursor>,
}

// =============================================================================
// Request Types
// =============================================================================

enum IndexerRequest {
    Submit {
        logs: Vec<RawLog>,
        response: oneshot::Sender<Result<BatchReport>>,
    },
    Stats {
        response: oneshot::Sender<ProjectionStats>,
    },
    Checkpoint {
        response: oneshot::Sender<Option<Cursor>>,
    },
    Shutdown {
        response: oneshot::Sender<()>,
    },
}

// =============================================================================
// Indexer State
// =============================================================================

/// State owned by the indexer thread.
struct Indexer {
    store: SqliteStore,
    config: IndexerConfig,
    /// Counters over every committed chunk since startup.
    stats: ProjectionStats,
    /// Mirrors the `checkpoint` row.
    checkpoint: Option<Cursor>,
}

impl Indexer {
    fn new(db: Database, config: IndexerConfig) -> Result<Self> {
        let store = SqliteStore::new(db, config.packet_cache_size)?;
        let checkpoint = store.checkpoint()?;

        if let Some(cursor) = checkpoint {
            info!(checkpoint = %cursor, "resuming from checkpoint");
        }

        Ok(Self {
            store,
            config,
            stats: ProjectionStats::default(),
            checkpoint,
        })
    }

    fn process(&mut self, mut logs: Vec<RawLog>) -> Result<BatchReport> {
        let mut report = BatchReport {
            received: logs.len(),
            checkpoint: self.checkpoint,
            ..BatchReport::default()
        };

        logs.sort_by_key(RawLog::cursor);

        for chunk in logs.chunks(self.config.batch_max_size) {
            let (stats, checkpoint) = match self.apply_chunk(chunk) {
                Ok(applied) => applied,
                Err(e) => {
                    error!(
                        error = %e,
                        logs = chunk.len(),
                        checkpoint = ?self.checkpoint,
                        "chunk rolled back"
                    );
                    return Err(e);
                }
            };

            // committed; now memory may catch up
            self.checkpoint = checkpoint;
            self.stats.merge(&stats);
            report.stats.merge(&stats);
            report.chunks += 1;
            report.checkpoint = checkpoint;

            info!(
                logs = chunk.len(),
                checkpoint = ?checkpoint,
                packets_created = stats.packets_created,
                claims_recorded = stats.claims_recorded,
                anomalies = stats.anomalies(),
                "chunk committed"
            );
        }

        Ok(report)
    }

    /// Applies one chunk inside a single transaction.
    ///
    /// Returns the chunk's counters and the checkpoint it committed.
    fn apply_chunk(&mut self, chunk: &[RawLog]) -> Result<(ProjectionStats, Option<Cursor>)> {
        let config = &self.config;
        let start = self.checkpoint;

        self.store.transaction(|store| {
            let mut stats = ProjectionStats::default();
            let mut last = start;

            for log in chunk {
                let cursor = log.cursor();
                if last.is_some_and(|seen| cursor <= seen) {
                    stats.stale_logs += 1;
                    continue;
                }
                // an unstorable position is a decode failure below; it cannot be a checkpoint
                if log.has_storable_cursor() {
                    last = Some(cursor);
                }

                if !config.accepts(&log.address, log.block_number) {
                    stats.ignored += 1;
                    continue;
                }

                match decode_log(log) {
                    Ok(Some(event)) => {
                        let outcome = projection::apply(store, &event)?;
                        stats.record(&outcome);
                    }
                    Ok(None) => {
                        debug!(
                            tx_hash = %log.transaction_hash,
                            log_index = log.log_index,
                            "unrelated log ignored"
                        );
                        stats.ignored += 1;
                    }
                    Err(e) => {
                        warn!(
                            tx_hash = %log.transaction_hash,
                            log_index = log.log_index,
                            block = log.block_number,
                            error = %e,
                            "undecodable log skipped"
                        );
                        store.record_anomaly(&Anomaly {
                            kind: AnomalyKind::DecodeFailure,
                            packet_id: None,
                            tx_hash: log.transaction_hash,
                            log_index: log.log_index,
                            block_number: log.block_number,
                            detail: e.to_string(),
                        })?;
                        stats.decode_failures += 1;
                    }
                }
            }

            if last != start {
                if let Some(cursor) = &last {
                    store.set_checkpoint(cursor)?;
                }
            }

            Ok((stats, last))
        })
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Async handle to the indexer thread.
///
/// Cheap to clone; all clones talk to the same actor.
#[derive(Clone)]
pub struct IndexerHandle {
    tx: mpsc::Sender<IndexerRequest>,
}

impl IndexerHandle {
    /// Projects a set of logs, in chain order regardless of input order.
    ///
    /// # Errors
    ///
    /// A store failure rolls back the chunk in progress and is returned
    /// as-is. Earlier chunks of the same call remain committed; resubmitting
    /// the same logs is safe because committed ones are now stale.
    pub async fn submit(&self, logs: Vec<RawLog>) -> Result<BatchReport> {
        let (response, rx) = oneshot::channel();
        self.send(IndexerRequest::Submit { logs, response }).await?;
        rx.await.map_err(|_| Error::IndexerClosed)?
    }

    /// Counters accumulated since the indexer started.
    pub async fn stats(&self) -> Result<ProjectionStats> {
        let (response, rx) = oneshot::channel();
        self.send(IndexerRequest::Stats { response }).await?;
        rx.await.map_err(|_| Error::IndexerClosed)
    }

    /// Cursor of the last consumed log, or `None` before the first one.
    pub async fn checkpoint(&self) -> Result<Option<Cursor>> {
        let (response, rx) = oneshot::channel();
        self.send(IndexerRequest::Checkpoint { response }).await?;
        rx.await.map_err(|_| Error::IndexerClosed)
    }

    /// Stops the indexer after the requests queued before this one.
    ///
    /// Resolves once the write connection has been closed.
    pub async fn shutdown(&self) -> Result<()> {
        let (response, rx) = oneshot::channel();
        self.send(IndexerRequest::Shutdown { response }).await?;
        rx.await.map_err(|_| Error::IndexerClosed)
    }

    async fn send(&self, request: IndexerRequest) -> Result<()> {
        self.tx.send(request).await.map_err(|_| Error::IndexerClosed)
    }
}

// =============================================================================
// Indexer Loop
// =============================================================================

async fn run_indexer(mut indexer: Indexer, mut rx: mpsc::Receiver<IndexerRequest>) {
    let mut shutdown_ack = None;

    while let Some(request) = rx.recv().await {
        match request {
            IndexerRequest::Submit { logs, response } => {
                let _ = response.send(indexer.process(logs));
            }
            IndexerRequest::Stats { response } => {
                let _ = response.send(indexer.stats);
            }
            IndexerRequest::Checkpoint { response } => {
                let _ = response.send(indexer.checkpoint);
            }
            IndexerRequest::Shutdown { response } => {
                shutdown_ack = Some(response);
                break;
            }
        }
    }

    let checkpoint = indexer.checkpoint;
    drop(rx);
    drop(indexer);
    info!(checkpoint = ?checkpoint, "indexer stopped");

    if let Some(ack) = shutdown_ack {
        let _ = ack.send(());
    }
}

/// Spawns the indexer on a dedicated thread.
///
/// The thread owns `db` for its whole life. Read queries should open their
/// own connection to the same file (see [`query`](crate::query)).
///
/// # Errors
///
/// `Error::Config` for invalid settings, `Error::Sqlite` if the checkpoint
/// can't be read, `Error::Io` if the runtime or thread can't be created.
pub fn spawn_indexer(db: Database, config: IndexerConfig) -> Result<IndexerHandle> {
    config.validate()?;

    let (tx, rx) = mpsc::channel(config.channel_size);
    let indexer = Indexer::new(db, config)?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("redpacket-indexer".to_string())
        .spawn(move || rt.block_on(run_indexer(indexer, rx)))?;

    Ok(IndexerHandle { tx })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PacketCreatedEvent;
    use crate::types::{Address, BlockMeta, PacketId, PacketType, B256, U256};

    fn created_log(block_number: u64, log_index: u32, id_byte: u8) -> RawLog {
        RawLog::packet_created(
            Address::ZERO,
            &PacketCreatedEvent {
                id: PacketId::new(B256::repeat_byte(id_byte)),
                creator: Address::repeat_byte(0xc0),
                total_amount: U256::from(100u64),
                count: 2,
                packet_type: PacketType::Equal,
                block: BlockMeta {
                    block_number,
                    block_timestamp: 1_000 + block_number,
                    tx_hash: B256::repeat_byte(id_byte),
                    log_index,
                },
            },
        )
    }

    fn indexer(config: IndexerConfig) -> Indexer {
        Indexer::new(Database::open_in_memory().unwrap(), config).unwrap()
    }

    #[test]
    fn test_chunks_follow_batch_max_size() {
        let mut indexer = indexer(IndexerConfig {
            batch_max_size: 2,
            ..IndexerConfig::default()
        });

        let logs = (1..=5).map(|i| created_log(i, 0, i as u8)).collect();
        let report = indexer.process(logs).unwrap();

        assert_eq!(report.chunks, 3);
        assert_eq!(report.stats.packets_created, 5);
        assert_eq!(
            report.checkpoint,
            Some(Cursor { block_number: 5, log_index: 0 })
        );
        assert_eq!(indexer.store.checkpoint().unwrap(), report.checkpoint);
    }

    #[test]
    fn test_unsorted_input_is_applied_in_chain_order() {
        let mut indexer = indexer(IndexerConfig::default());

        let logs = vec![created_log(9, 1, 3), created_log(9, 0, 2), created_log(2, 0, 1)];
        let report = indexer.process(logs).unwrap();

        assert_eq!(report.stats.packets_created, 3);
        assert_eq!(report.stats.stale_logs, 0);
        assert_eq!(
            report.checkpoint,
            Some(Cursor { block_number: 9, log_index: 1 })
        );
    }

    #[test]
    fn test_stale_logs_are_skipped() {
        let mut indexer = indexer(IndexerConfig::default());
        indexer.process(vec![created_log(5, 0, 1)]).unwrap();

        let report = indexer
            .process(vec![created_log(4, 0, 2), created_log(5, 0, 1), created_log(6, 0, 3)])
            .unwrap();

        assert_eq!(report.stats.stale_logs, 2);
        assert_eq!(report.stats.packets_created, 1);
        assert_eq!(indexer.stats.packets_created, 2);
    }

    #[test]
    fn test_foreign_contract_and_early_blocks_are_ignored() {
        let mut indexer = indexer(IndexerConfig {
            contract_address: Some(Address::repeat_byte(0x01)),
            start_block: 10,
            ..IndexerConfig::default()
        });

        let mut ours = created_log(12, 0, 1);
        ours.address = Address::repeat_byte(0x01);
        let mut early = created_log(9, 0, 2);
        early.address = Address::repeat_byte(0x01);
        let foreign = created_log(11, 0, 3);

        let report = indexer.process(vec![ours, early, foreign]).unwrap();
        assert_eq!(report.stats.packets_created, 1);
        assert_eq!(report.stats.ignored, 2);
        // ignored logs still advance the checkpoint
        assert_eq!(
            report.checkpoint,
            Some(Cursor { block_number: 12, log_index: 0 })
        );
    }

    #[test]
    fn test_decode_failure_is_recorded_not_fatal() {
        let mut indexer = indexer(IndexerConfig::default());

        let mut bad = created_log(1, 0, 1);
        bad.data = crate::types::Bytes::from(vec![1u8; 3]);
        let good = created_log(1, 1, 2);

        let report = indexer.process(vec![bad, good]).unwrap();
        assert_eq!(report.stats.decode_failures, 1);
        assert_eq!(report.stats.packets_created, 1);

        let kinds: i64 = indexer
            .store
            .connection()
            .query_row(
                "SELECT COUNT(*) FROM anomalies WHERE kind = 'decode_failure' AND packet_id IS NULL",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kinds, 1);
    }

    #[test]
    fn test_unstorable_position_is_recorded_but_not_checkpointed() {
        let mut indexer = indexer(IndexerConfig::default());

        let mut bad = created_log(2, 0, 1);
        bad.log_index = u64::MAX;
        let good = created_log(3, 0, 2);

        let report = indexer.process(vec![good, bad]).unwrap();
        assert_eq!(report.stats.decode_failures, 1);
        assert_eq!(report.stats.packets_created, 1);
        assert_eq!(
            report.checkpoint,
            Some(Cursor { block_number: 3, log_index: 0 })
        );

        let mut tail = created_log(4, 0, 3);
        tail.block_number = u64::MAX;
        let report = indexer.process(vec![tail]).unwrap();
        assert_eq!(report.stats.decode_failures, 1);
        assert_eq!(
            report.checkpoint,
            Some(Cursor { block_number: 3, log_index: 0 })
        );
        assert_eq!(indexer.store.checkpoint().unwrap(), report.checkpoint);
    }

    #[tokio::test]
    async fn test_handle_round_trip_and_shutdown() {
        let handle = spawn_indexer(Database::open_in_memory().unwrap(), IndexerConfig::default())
            .unwrap();

        assert_eq!(handle.checkpoint().await.unwrap(), None);

        let report = handle.submit(vec![created_log(3, 0, 1)]).await.unwrap();
        assert_eq!(report.received, 1);
        assert_eq!(handle.stats().await.unwrap().packets_created, 1);

        handle.shutdown().await.unwrap();
        assert!(matches!(
            handle.submit(Vec::new()).await,
            Err(Error::IndexerClosed)
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected_before_spawning() {
        let result = spawn_indexer(
            Database::open_in_memory().unwrap(),
            IndexerConfig {
                batch_max_size: 0,
                ..IndexerConfig::default()
            },
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
