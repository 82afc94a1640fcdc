//! Indexer configuration.
//!
//! Every field has a default, so an empty TOML document (or
//! [`IndexerConfig::default`]) is a working in-process setup:
//!
//! ```toml
//! database_path = "redpacket.db"
//! contract_address = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//! start_block = 0
//! batch_max_size = 500
//! packet_cache_size = 1024
//! channel_size = 1024
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Address;

/// Default logs per SQLite transaction.
pub const DEFAULT_BATCH_MAX_SIZE: usize = 500;

/// Default number of packets kept in the LRU cache.
pub const DEFAULT_PACKET_CACHE_SIZE: usize = 1024;

/// Default capacity of the indexer's request channel.
pub const DEFAULT_CHANNEL_SIZE: usize = 1024;

/// Settings for [`spawn_indexer`](crate::indexer::spawn_indexer) and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexerConfig {
    /// SQLite file holding the read model.
    pub database_path: PathBuf,

    /// Only logs emitted by this address are projected. `None` accepts any
    /// emitter.
    pub contract_address: Option<Address>,

    /// Logs from earlier blocks are ignored (the contract's deployment block).
    pub start_block: u64,

    /// Logs applied per SQLite transaction.
    pub batch_max_size: usize,

    /// LRU entries in front of the `packets` table.
    pub packet_cache_size: usize,

    /// Pending requests the indexer channel can hold.
    pub channel_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("redpacket.db"),
            contract_address: None,
            start_block: 0,
            batch_max_size: DEFAULT_BATCH_MAX_SIZE,
            packet_cache_size: DEFAULT_PACKET_CACHE_SIZE,
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

impl IndexerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// `Error::Io` if the file can't be read, `Error::Toml` if it doesn't
    /// parse, `Error::Config` if a value is out of range.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects sizes the indexer cannot run with.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("batch_max_size", self.batch_max_size),
            ("packet_cache_size", self.packet_cache_size),
            ("channel_size", self.channel_size),
        ] {
            if value == 0 {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    /// Whether a log from `emitter` at `block_number` belongs to this
    /// deployment.
    pub fn accepts(&self, emitter: &Address, block_number: u64) -> bool {
        block_number >= self.start_block
            && self
                .contract_address
                .map_or(true, |contract| contract == *emitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = IndexerConfig::from_toml("").unwrap();
        assert_eq!(config, IndexerConfig::default());
        assert_eq!(config.batch_max_size, DEFAULT_BATCH_MAX_SIZE);
    }

    #[test]
    fn test_full_toml() {
        let config = IndexerConfig::from_toml(
            r#"
            database_path = "/var/lib/redpacket/index.db"
            contract_address = "0x5fbdb2315678afecb367f032d93f642f64180aa3"
            start_block = 1200
            batch_max_size = 50
            packet_cache_size = 8
            channel_size = 16
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/redpacket/index.db"));
        assert_eq!(config.start_block, 1200);
        assert_eq!(config.batch_max_size, 50);
        assert!(config.contract_address.is_some());
    }

    #[test]
    fn test_zero_sizes_are_rejected() {
        let err = IndexerConfig::from_toml("batch_max_size = 0").unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("batch_max_size")));

        let config = IndexerConfig {
            channel_size: 0,
            ..IndexerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let err = IndexerConfig::from_toml("batch_size = 10").unwrap_err();
        assert!(matches!(err, Error::Toml(_)));
    }

    #[test]
    fn test_accepts_filters_by_contract_and_block() {
        let contract = Address::repeat_byte(0xaa);
        let config = IndexerConfig {
            contract_address: Some(contract),
            start_block: 10,
            ..IndexerConfig::default()
        };

        assert!(config.accepts(&contract, 10));
        assert!(!config.accepts(&contract, 9));
        assert!(!config.accepts(&Address::repeat_byte(0xbb), 10));
        assert!(IndexerConfig::default().accepts(&Address::ZERO, 0));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indexer.toml");
        std::fs::write(&path, "start_block = 7\n").unwrap();

        let config = IndexerConfig::from_file(&path).unwrap();
        assert_eq!(config.start_block, 7);

        let missing = IndexerConfig::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, Error::Io(_)));
    }
}
