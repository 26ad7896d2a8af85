//! In-memory log store.

use crate::error::{StorageError, StorageResult};
use crate::log::LogStore;
use parking_lot::Mutex;

/// A log store that keeps each appended frame as its own chunk.
///
/// Chunked storage mirrors the record-oriented shape of the WAL: one
/// append, one chunk, no buffer reshuffling. Reads stitch ranges back
/// together across chunk boundaries, which is exactly what recovery
/// exercises.
///
/// Built for ephemeral engines and for recovery tests: a log can be
/// seeded with arbitrary (possibly corrupted) bytes via
/// [`MemoryLog::with_bytes`], and [`MemoryLog::with_capacity_limit`]
/// simulates a device that stops accepting writes mid-stream.
#[derive(Debug, Default)]
pub struct MemoryLog {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    frames: Vec<Vec<u8>>,
    len: u64,
    capacity: Option<u64>,
}

impl MemoryLog {
    /// Creates an empty, unbounded log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a log seeded with raw bytes, as if they had been
    /// appended before.
    #[must_use]
    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() as u64;
        let frames = if bytes.is_empty() { Vec::new() } else { vec![bytes] };
        Self {
            inner: Mutex::new(Inner {
                frames,
                len,
                capacity: None,
            }),
        }
    }

    /// Creates a log that rejects appends once `capacity` bytes are
    /// stored, for exercising WAL-append failure paths.
    #[must_use]
    pub fn with_capacity_limit(capacity: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                frames: Vec::new(),
                len: 0,
                capacity: Some(capacity),
            }),
        }
    }

    /// Number of appended frames.
    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.inner.lock().frames.len()
    }
}

impl LogStore for MemoryLog {
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();

        if let Some(capacity) = inner.capacity {
            if inner.len + frame.len() as u64 > capacity {
                return Err(StorageError::LogFull { capacity });
            }
        }

        let offset = inner.len;
        if !frame.is_empty() {
            inner.len += frame.len() as u64;
            inner.frames.push(frame.to_vec());
        }
        Ok(offset)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let inner = self.inner.lock();
        let wanted = buf.len();

        if offset + wanted as u64 > inner.len {
            return Err(StorageError::ShortRead {
                offset,
                wanted,
                available: inner.len.saturating_sub(offset),
            });
        }

        // Walk the chunks, copying the overlap of each with the
        // requested range until the buffer is full.
        let mut chunk_start = 0u64;
        let mut filled = 0usize;
        for frame in &inner.frames {
            let chunk_end = chunk_start + frame.len() as u64;
            let read_at = offset + filled as u64;
            if read_at < chunk_end {
                let begin = (read_at - chunk_start) as usize;
                let take = usize::min(frame.len() - begin, wanted - filled);
                buf[filled..filled + take].copy_from_slice(&frame[begin..begin + take]);
                filled += take;
                if filled == wanted {
                    break;
                }
            }
            chunk_start = chunk_end;
        }
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }

    fn flush(&mut self) -> StorageResult<()> {
        // Nothing is buffered; every append is already "durable".
        Ok(())
    }
}
