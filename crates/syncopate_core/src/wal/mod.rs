//! Write-ahead log.
//!
//! Every successful mutation appends one record before touching in-memory
//! state; recovery replays the log from the beginning. Record bodies may
//! be zstd-compressed; framing is never compressed.

mod codec;
mod record;
mod writer;

pub use codec::{compression_ratio, format_ratio, CompressionCodec};
pub use record::{compute_crc32, WalOp, WalRecord, FLAG_COMPRESSED, WAL_MAGIC, WAL_VERSION};
pub use writer::{WalManager, WalStats};
