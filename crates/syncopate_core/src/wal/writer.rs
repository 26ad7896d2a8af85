//! WAL writer and recovery reader.

use crate::error::{EngineError, EngineResult};
use crate::wal::codec::{compression_ratio, CompressionCodec};
use crate::wal::record::{compute_crc32, WalOp, WalRecord, FLAG_COMPRESSED, WAL_MAGIC, WAL_VERSION};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use syncopate_storage::LogStore;

/// Frame bytes before the body: magic (4) + version (2) + op (1) +
/// flags (1) + body length (4).
const HEADER_SIZE: usize = 12;

/// Trailing CRC bytes.
const CRC_SIZE: usize = 4;

/// Running totals for a WAL.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalStats {
    /// Records appended since open.
    pub records: u64,
    /// Body bytes before compression.
    pub raw_bytes: u64,
    /// Body bytes as stored.
    pub stored_bytes: u64,
}

impl WalStats {
    /// Compression ratio achieved so far (original / stored, 1.0 = none).
    #[must_use]
    pub fn ratio(&self) -> f64 {
        compression_ratio(self.raw_bytes, self.stored_bytes)
    }
}

/// Appends records to and replays records from a log store.
///
/// The writer owns its store behind a mutex: an append completes (or
/// fails) before the caller applies the mutation to memory, and append
/// order equals apply order because the engine appends while holding its
/// write lock.
pub struct WalManager {
    store: Mutex<Box<dyn LogStore>>,
    codec: Option<CompressionCodec>,
    sync_on_write: bool,
    records: AtomicU64,
    raw_bytes: AtomicU64,
    stored_bytes: AtomicU64,
}

impl WalManager {
    /// Creates a WAL manager over a log store.
    pub fn new(
        store: Box<dyn LogStore>,
        codec: Option<CompressionCodec>,
        sync_on_write: bool,
    ) -> Self {
        Self {
            store: Mutex::new(store),
            codec,
            sync_on_write,
            records: AtomicU64::new(0),
            raw_bytes: AtomicU64::new(0),
            stored_bytes: AtomicU64::new(0),
        }
    }

    /// Appends a record, returning the offset its frame starts at.
    ///
    /// # Errors
    ///
    /// Fails on encoding or I/O errors; the caller must not apply the
    /// mutation when this fails.
    pub fn append(&self, record: &WalRecord) -> EngineResult<u64> {
        let raw_body = record.encode_body()?;

        let mut flags = 0u8;
        let body = match &self.codec {
            Some(codec) => {
                let compressed = codec.compress(&raw_body)?;
                // Keep incompressible bodies plain.
                if compressed.len() < raw_body.len() {
                    flags |= FLAG_COMPRESSED;
                    compressed
                } else {
                    raw_body.clone()
                }
            }
            None => raw_body.clone(),
        };

        let len = u32::try_from(body.len())
            .map_err(|_| EngineError::internal("WAL record body too large"))?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + body.len() + CRC_SIZE);
        frame.extend_from_slice(&WAL_MAGIC);
        frame.extend_from_slice(&WAL_VERSION.to_le_bytes());
        frame.push(record.op().as_byte());
        frame.push(flags);
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&body);

        let crc = compute_crc32(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        let mut store = self.store.lock();
        let offset = store.append(&frame)?;
        if self.sync_on_write {
            store.flush()?;
        }
        drop(store);

        self.records.fetch_add(1, Ordering::Relaxed);
        self.raw_bytes
            .fetch_add(raw_body.len() as u64, Ordering::Relaxed);
        self.stored_bytes
            .fetch_add(body.len() as u64, Ordering::Relaxed);

        Ok(offset)
    }

    /// Replays every record from the beginning of the log.
    ///
    /// Returns the number of records replayed. Any framing problem —
    /// bad magic, unknown op kind, CRC mismatch, truncated tail — aborts
    /// recovery with [`EngineError::WalCorruption`].
    pub fn replay<F>(&self, mut apply: F) -> EngineResult<usize>
    where
        F: FnMut(WalRecord) -> EngineResult<()>,
    {
        let store = self.store.lock();
        let len = store.len()?;
        let mut offset = 0u64;
        let mut count = 0usize;

        while offset < len {
            let mut header = [0u8; HEADER_SIZE];
            store.read_exact_at(offset, &mut header).map_err(|_| {
                EngineError::WalCorruption(format!("truncated record header at offset {offset}"))
            })?;

            if header[0..4] != WAL_MAGIC {
                return Err(EngineError::WalCorruption(format!(
                    "bad magic at offset {offset}"
                )));
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != WAL_VERSION {
                return Err(EngineError::WalCorruption(format!(
                    "unsupported WAL version {version}"
                )));
            }
            let op = WalOp::from_byte(header[6]).ok_or_else(|| {
                EngineError::WalCorruption(format!(
                    "unknown record kind {} at offset {offset}",
                    header[6]
                ))
            })?;
            let flags = header[7];
            let body_len =
                u32::from_le_bytes([header[8], header[9], header[10], header[11]]) as usize;

            // Validate the advertised length against the log tail before
            // trusting it for an allocation.
            let body_offset = offset + HEADER_SIZE as u64;
            if body_offset + body_len as u64 + CRC_SIZE as u64 > len {
                return Err(EngineError::WalCorruption(format!(
                    "truncated record at offset {offset}"
                )));
            }

            let mut body = vec![0u8; body_len];
            let mut crc_bytes = [0u8; CRC_SIZE];
            store.read_exact_at(body_offset, &mut body)?;
            store.read_exact_at(body_offset + body_len as u64, &mut crc_bytes)?;
            let stored_crc = u32::from_le_bytes(crc_bytes);

            let mut covered = Vec::with_capacity(HEADER_SIZE + body_len);
            covered.extend_from_slice(&header);
            covered.extend_from_slice(&body);
            let actual_crc = compute_crc32(&covered);
            if actual_crc != stored_crc {
                return Err(EngineError::WalCorruption(format!(
                    "checksum mismatch at offset {offset}: expected {stored_crc:08x}, got {actual_crc:08x}"
                )));
            }

            let body = if flags & FLAG_COMPRESSED != 0 {
                let codec = self.codec.unwrap_or_default();
                codec.decompress(&body)?
            } else {
                body
            };

            apply(WalRecord::decode_body(op, &body)?)?;

            count += 1;
            offset = body_offset + body_len as u64 + CRC_SIZE as u64;
        }

        Ok(count)
    }

    /// Flushes the store.
    pub fn flush(&self) -> EngineResult<()> {
        self.store.lock().flush()?;
        Ok(())
    }

    /// Current log size in bytes.
    pub fn size(&self) -> EngineResult<u64> {
        Ok(self.store.lock().len()?)
    }

    /// Totals for appended records.
    #[must_use]
    pub fn stats(&self) -> WalStats {
        WalStats {
            records: self.records.load(Ordering::Relaxed),
            raw_bytes: self.raw_bytes.load(Ordering::Relaxed),
            stored_bytes: self.stored_bytes.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalManager")
            .field("sync_on_write", &self.sync_on_write)
            .field("compressed", &self.codec.is_some())
            .finish_non_exhaustive()
    }
}
