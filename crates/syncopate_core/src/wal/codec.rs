//! zstd compression of WAL record bodies.

use crate::error::{EngineError, EngineResult};

/// Compresses and decompresses record bodies.
///
/// Only the body of a record is compressed; the framing (magic, op,
/// length, CRC) always stays plain so recovery can walk the log without
/// decompressing anything it does not need.
#[derive(Debug, Clone, Copy)]
pub struct CompressionCodec {
    level: i32,
}

impl CompressionCodec {
    /// Creates a codec with the given zstd level.
    #[must_use]
    pub const fn new(level: i32) -> Self {
        Self { level }
    }

    /// Compresses `data`.
    pub fn compress(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        zstd::bulk::compress(data, self.level)
            .map_err(|e| EngineError::internal(format!("compression failed: {e}")))
    }

    /// Decompresses `data`.
    pub fn decompress(&self, data: &[u8]) -> EngineResult<Vec<u8>> {
        zstd::stream::decode_all(data)
            .map_err(|e| EngineError::WalCorruption(format!("decompression failed: {e}")))
    }
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self::new(3)
    }
}

/// Compression ratio as original / compressed; `1.0` means none.
#[must_use]
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if compressed == 0 || original == 0 {
        return 1.0;
    }
    original as f64 / compressed as f64
}

/// Renders a ratio for humans, e.g. `"60.0% smaller (2.5x)"`.
#[must_use]
pub fn format_ratio(ratio: f64) -> String {
    if ratio <= 1.0 {
        return "0% (no compression)".to_string();
    }
    let reduction = (1.0 - (1.0 / ratio)) * 100.0;
    format!("{reduction:.1}% smaller ({ratio:.1}x)")
}
