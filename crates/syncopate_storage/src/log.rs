//! The log store trait.

use crate::error::StorageResult;

/// An append-only store for WAL frames.
///
/// The write side is a single tail pointer: `append` places a frame at
/// the end and reports where it landed. The read side serves recovery,
/// which knows frame boundaries from the framing itself and asks for
/// exact ranges into buffers it owns.
///
/// # Invariants
///
/// - `append` returns the offset the frame starts at
/// - after `flush`, every appended frame survives process termination
/// - `read_exact_at` either fills the whole buffer or fails with
///   [`crate::StorageError::ShortRead`] and touches nothing
/// - implementations are `Send + Sync`
pub trait LogStore: Send + Sync {
    /// Appends a frame, returning the offset it starts at.
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64>;

    /// Fills `buf` with the bytes at `offset`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::StorageError::ShortRead`] when fewer than
    /// `buf.len()` bytes exist past `offset`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()>;

    /// Total bytes in the log; the offset of the next append.
    fn len(&self) -> StorageResult<u64>;

    /// Whether the log holds no bytes.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Makes all appended frames durable.
    fn flush(&mut self) -> StorageResult<()>;

    /// Copies the whole log out, front to back.
    ///
    /// Useful for backup tooling and for tests that corrupt a log and
    /// replay it.
    fn read_to_end(&self) -> StorageResult<Vec<u8>> {
        let len = self.len()?;
        let mut buf = vec![0u8; len as usize];
        if len > 0 {
            self.read_exact_at(0, &mut buf)?;
        }
        Ok(buf)
    }
}
