//! # SyncopateDB Storage
//!
//! Log stores backing the write-ahead log.
//!
//! A [`LogStore`] is shaped around how the WAL actually behaves: framed
//! records are appended at the tail, and recovery walks the log from the
//! front, reading each frame into caller-owned buffers. Stores never
//! interpret frames — framing, checksums, and compression all live in
//! `syncopate_core`.
//!
//! Two implementations ship: [`FileLog`] for durable logs and
//! [`MemoryLog`] for ephemeral engines and recovery tests (it can seed
//! arbitrary bytes and simulate a device that stops accepting writes).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod log;
mod memory;

pub use error::{StorageError, StorageResult};
pub use file::FileLog;
pub use log::LogStore;
pub use memory::MemoryLog;
