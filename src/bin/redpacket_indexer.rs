//! Red Packet Indexer CLI
//!
//! Replays contract logs into a SQLite read model and queries it.
//!
//! # Examples
//!
//! ```bash
//! # Generate a synthetic log file and index it
//! redpacket-indexer simulate --packets 50 --seed 7 --out logs.jsonl
//! redpacket-indexer --db index.db replay logs.jsonl
//!
//! # Newest packets, and one address's claims
//! redpacket-indexer --db index.db packets --first 20
//! redpacket-indexer --db index.db claims --claimer 0x…
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use redpacket_indexer::events::{PacketClaimedEvent, PacketCreatedEvent};
use redpacket_indexer::query::{self, Direction, PacketQuery};
use redpacket_indexer::types::{Address, BlockMeta, PacketId, PacketType, B256, U256};
use redpacket_indexer::{spawn_indexer, Database, IndexerConfig, RawLog};

#[derive(Parser, Debug)]
#[command(name = "redpacket-indexer")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides the configuration file)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); `RUST_LOG` takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a JSON-lines file of raw logs
    Replay {
        /// One `RawLog` JSON object per line
        file: PathBuf,
    },

    /// Print the newest packets
    Packets {
        #[arg(short = 'n', long, default_value_t = 20)]
        first: usize,
    },

    /// Print the claims made by one address, newest first
    Claims {
        #[arg(long)]
        claimer: Address,

        #[arg(short = 'n', long, default_value_t = 20)]
        first: usize,
    },

    /// Print the most recent anomalies
    Anomalies {
        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// Write a synthetic, contract-consistent log file
    Simulate {
        /// Number of packets to create
        #[arg(long, default_value_t = 10)]
        packets: usize,

        /// RNG seed; the same seed produces the same file
        #[arg(long, default_value_t = 1)]
        seed: u64,

        /// Output file (JSON lines)
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => IndexerConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => IndexerConfig::default(),
    };
    if let Some(db) = cli.db {
        config.database_path = db;
    }

    match cli.command {
        Commands::Replay { file } => replay(&config, &file).await,
        Commands::Packets { first } => {
            let conn = open_reader(&config)?;
            let packets = query::packets(
                &conn,
                PacketQuery {
                    first,
                    ..PacketQuery::default()
                },
            )?;
            print_json(&packets)
        }
        Commands::Claims { claimer, first } => {
            let conn = open_reader(&config)?;
            let claims = query::claims_by_claimer(&conn, &claimer, first, Direction::Desc)?;
            print_json(&claims)
        }
        Commands::Anomalies { limit } => {
            let conn = open_reader(&config)?;
            print_json(&query::anomalies(&conn, limit)?)
        }
        Commands::Simulate { packets, seed, out } => simulate(packets, seed, &out),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn open_reader(config: &IndexerConfig) -> Result<rusqlite::Connection> {
    query::open_reader(&config.database_path).with_context(|| {
        format!(
            "failed to open {} (run `replay` first)",
            config.database_path.display()
        )
    })
}

// =============================================================================
// Replay
// =============================================================================

async fn replay(config: &IndexerConfig, file: &Path) -> Result<()> {
    let reader = BufReader::new(
        File::open(file).with_context(|| format!("failed to open {}", file.display()))?,
    );

    let mut logs = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let log: RawLog = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: not a raw log", file.display(), number + 1))?;
        logs.push(log);
    }
    info!(logs = logs.len(), file = %file.display(), "replaying");

    let db = Database::open(&config.database_path).with_context(|| {
        format!("failed to open {}", config.database_path.display())
    })?;
    let handle = spawn_indexer(db, config.clone())?;

    let report = handle.submit(logs).await?;
    handle.shutdown().await?;

    print_json(&report)
}

// =============================================================================
// Simulation
// =============================================================================

/// Wei per ether.
const WEI: u128 = 1_000_000_000_000_000_000;

/// Produces the log stream a well-behaved contract would emit.
///
/// Split rules: `Equal` pays `remaining / remaining_count`, `Random` pays a
/// uniform draw from `[1, 2 * remaining / remaining_count)`, and the last
/// share always takes whatever is left. Each address claims a packet at most
/// once.
struct Simulator {
    rng: StdRng,
    contract: Address,
    block_number: u64,
    log_index: u32,
    tx_counter: u64,
    logs: Vec<RawLog>,
}

/// Balances of a simulated packet, tracked outside the indexer.
struct LivePacket {
    id: PacketId,
    remaining: u128,
    remaining_count: u64,
    packet_type: PacketType,
    claimers: Vec<Address>,
}

impl Simulator {
    fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            contract: Address::repeat_byte(0x5f),
            block_number: 1,
            log_index: 0,
            tx_counter: 0,
            logs: Vec::new(),
        }
    }

    /// Metadata for the next log; advances the chain position.
    fn next_block(&mut self) -> BlockMeta {
        if self.rng.gen_bool(0.4) {
            self.block_number += 1;
            self.log_index = 0;
        }
        self.tx_counter += 1;

        let mut tx_hash = B256::ZERO;
        tx_hash.0[24..].copy_from_slice(&self.tx_counter.to_be_bytes());

        let meta = BlockMeta {
            block_number: self.block_number,
            block_timestamp: 1_700_000_000 + self.block_number * 12,
            tx_hash,
            log_index: self.log_index,
        };
        self.log_index += 1;
        meta
    }

    fn create(&mut self) -> LivePacket {
        let mut id = B256::ZERO;
        self.rng.fill(&mut id.0[..]);
        let id = PacketId::new(id);

        let count = self.rng.gen_range(1..=10u64);
        // 0.01 .. 10 ether
        let total = u128::from(self.rng.gen_range(1..=1000u64)) * (WEI / 100);
        let packet_type = if self.rng.gen_bool(0.5) {
            PacketType::Equal
        } else {
            PacketType::Random
        };

        let event = PacketCreatedEvent {
            id,
            creator: Address::repeat_byte(self.rng.gen_range(1..=16u8)),
            total_amount: U256::from(total),
            count,
            packet_type,
            block: self.next_block(),
        };
        self.logs.push(RawLog::packet_created(self.contract, &event));

        LivePacket {
            id,
            remaining: total,
            remaining_count: count,
            packet_type,
            claimers: Vec::new(),
        }
    }

    fn share(&mut self, packet: &LivePacket) -> u128 {
        if packet.remaining_count == 1 {
            return packet.remaining;
        }
        let average = packet.remaining / u128::from(packet.remaining_count);
        match packet.packet_type {
            PacketType::Equal => average,
            PacketType::Random if average <= 1 => average,
            PacketType::Random => self.rng.gen_range(1..average * 2),
        }
    }

    fn claim(&mut self, packet: &mut LivePacket) -> bool {
        if packet.remaining_count == 0 {
            return false;
        }

        let claimer = Address::repeat_byte(self.rng.gen_range(0x20..=0x3fu8));
        if packet.claimers.contains(&claimer) {
            return false;
        }

        let amount = self.share(packet);
        packet.remaining -= amount;
        packet.remaining_count -= 1;
        packet.claimers.push(claimer);

        let event = PacketClaimedEvent {
            id: packet.id,
            claimer,
            amount: U256::from(amount),
            block: self.next_block(),
        };
        self.logs.push(RawLog::packet_claimed(self.contract, &event));
        true
    }
}

fn simulate(packets: usize, seed: u64, out: &Path) -> Result<()> {
    let mut sim = Simulator::new(seed);
    let mut live: Vec<LivePacket> = Vec::new();

    for _ in 0..packets {
        live.push(sim.create());

        // interleave claims against any open packet
        let claims = sim.rng.gen_range(0..=6usize);
        for _ in 0..claims {
            let pick = sim.rng.gen_range(0..live.len());
            sim.claim(&mut live[pick]);
        }
    }

    let mut writer = BufWriter::new(
        File::create(out).with_context(|| format!("failed to create {}", out.display()))?,
    );
    for log in &sim.logs {
        serde_json::to_writer(&mut writer, log)?;
        writeln!(writer)?;
    }
    writer.flush()?;

    let exhausted = live.iter().filter(|p| p.remaining_count == 0).count();
    info!(
        packets,
        logs = sim.logs.len(),
        exhausted,
        seed,
        out = %out.display(),
        "simulation written"
    );
    Ok(())
}
