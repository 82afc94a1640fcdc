//! # Error Handling for the Red Packet Indexer
//!
//! This module defines the error types used throughout the indexer. We use a
//! single error enum ([`Error`]) to represent every failure mode, which keeps
//! function signatures short and lets callers handle failures uniformly.
//!
//! ## Rust Pattern: thiserror
//!
//! We use the `thiserror` crate to derive `std::error::Error` implementations.
//! This provides:
//! - Automatic `Display` implementation from the `#[error(...)]` attributes
//! - Automatic `From` implementations from the `#[from]` attributes
//! - Proper error source chaining via `#[source]`
//!
//! ## What Is NOT an Error
//!
//! Projection anomalies are data, not failures. A duplicate creation, an
//! orphan claim or a balance underflow is reported as an
//! [`Outcome`](crate::projection::Outcome) and logged; it never aborts the
//! event stream. Only the conditions below stop a batch.
//!
//! ## Error Categories
//!
//! | Category | Examples | Typical Response |
//! |----------|----------|------------------|
//! | Store | SQLite error, corrupt column | Roll back, retry the batch |
//! | Decode | Malformed log payload | Skip the log, count it |
//! | Setup | Bad config, schema mismatch | Fix and restart |
//! | Lifecycle | Indexer thread gone | Restart the indexer |

use thiserror::Error;

// =============================================================================
// Error Type
// =============================================================================

/// All errors that can occur in indexer operations.
///
/// # Example
///
/// ```rust,ignore
/// use redpacket_indexer::{Error, Result};
///
/// fn example() -> Result<()> {
///     let err = Error::Config("batch_max_size must be positive".to_string());
///     assert!(err.to_string().contains("batch_max_size"));
///
///     // Or propagated with ?
///     some_operation()?;
///
///     Ok(())
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Store Errors (roll back, let the caller retry)
    // =========================================================================

    /// SQLite operation failed.
    ///
    /// # When This Happens
    ///
    /// This wraps any error from the `rusqlite` crate:
    /// - Database file is locked by another process
    /// - Disk is full
    /// - SQL syntax error (indicates a bug in the indexer)
    ///
    /// The indexer rolls back the current batch and hands this error to the
    /// caller. Handlers never retry on their own.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Schema version mismatch or a stored value that cannot be decoded.
    ///
    /// # When This Happens
    ///
    /// - Opening a database created by a newer indexer version
    /// - A BLOB column holding the wrong number of bytes
    /// - An integer column outside the range of its Rust type
    #[error("schema error: {0}")]
    Schema(String),

    // =========================================================================
    // Decode Errors (skip the log, keep going)
    // =========================================================================

    /// A log carried the signature of a known event but its payload is invalid.
    ///
    /// # When This Happens
    ///
    /// - ABI data too short or with dirty padding
    /// - `packetType` outside {0, 1}
    /// - `count` or `logIndex` too large for the indexer's integer types
    #[error("cannot decode log {tx_hash}:{log_index}: {reason}")]
    Decode {
        /// Transaction hash of the offending log (0x-prefixed hex)
        tx_hash: String,
        /// Position of the log within its block
        log_index: u64,
        /// Human-readable reason
        reason: String,
    },

    // =========================================================================
    // Setup Errors
    // =========================================================================

    /// Configuration values are present but unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Reading a config file or an event log file failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON event log line could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A TOML config file could not be parsed.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================

    /// The indexer thread has shut down or dropped the response.
    #[error("indexer has shut down")]
    IndexerClosed,
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// A `Result` type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Error messages end up in logs; keep them readable.
    #[test]
    fn test_error_display() {
        let decode = Error::Decode {
            tx_hash: "0xabc".to_string(),
            log_index: 7,
            reason: "packetType 9 is not a known split policy".to_string(),
        };
        assert_eq!(
            decode.to_string(),
            "cannot decode log 0xabc:7: packetType 9 is not a known split policy"
        );

        let config = Error::Config("batch_max_size must be positive".to_string());
        assert_eq!(
            config.to_string(),
            "invalid configuration: batch_max_size must be positive"
        );

        assert_eq!(Error::IndexerClosed.to_string(), "indexer has shut down");
    }

    /// Verify that rusqlite errors convert automatically via `?`.
    #[test]
    fn test_sqlite_error_conversion() {
        let sqlite_err = rusqlite::Error::InvalidParameterName("test".to_string());

        let our_err: Error = sqlite_err.into();

        assert!(matches!(our_err, Error::Sqlite(_)));
        assert!(our_err.to_string().contains("sqlite error"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u64>("not a number").unwrap_err();
        let our_err: Error = json_err.into();
        assert!(matches!(our_err, Error::Json(_)));
    }
}
