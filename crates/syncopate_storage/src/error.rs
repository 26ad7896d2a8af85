//! Storage error types.

use std::io;
use thiserror::Error;

/// Result type for log store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by log stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O failure, annotated with the log file it happened on.
    #[error("I/O failure on log '{path}': {source}")]
    Io {
        /// Path of the log file.
        path: String,
        /// The underlying failure.
        #[source]
        source: io::Error,
    },

    /// A frame read ran off the end of the log. During recovery this
    /// usually means the final append was torn.
    #[error("short read at offset {offset}: wanted {wanted} bytes, only {available} available")]
    ShortRead {
        /// Offset the read started at.
        offset: u64,
        /// Bytes the caller asked for.
        wanted: usize,
        /// Bytes actually available from that offset.
        available: u64,
    },

    /// The store stopped accepting writes at its configured capacity.
    #[error("log store capacity of {capacity} bytes exhausted")]
    LogFull {
        /// The configured capacity in bytes.
        capacity: u64,
    },
}
