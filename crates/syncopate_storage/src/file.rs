//! File-backed log store.

use crate::error::{StorageError, StorageResult};
use crate::log::LogStore;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A log store persisted to a single file.
///
/// The file is held in append mode, so the OS pins every write to the
/// current end of the file: the tail pointer can never be clobbered by
/// a stray seek, and reads are free to reposition the cursor without
/// coordinating with writers. One mutex covers the file handle and the
/// tracked length — the WAL serializes appends anyway, so finer locking
/// buys nothing here.
///
/// `flush` syncs file data and metadata; it is the durability point for
/// WAL appends. Every error is annotated with the log's path.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    inner: Mutex<FileInner>,
}

#[derive(Debug)]
struct FileInner {
    file: File,
    len: u64,
}

impl FileLog {
    /// Opens the log at `path`, creating missing parent directories and
    /// the file itself as needed. An existing log resumes at its
    /// current tail.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| annotate(&path, e))?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| annotate(&path, e))?;
        let len = file.metadata().map_err(|e| annotate(&path, e))?.len();

        Ok(Self {
            path,
            inner: Mutex::new(FileInner { file, len }),
        })
    }

    /// Path of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogStore for FileLog {
    fn append(&mut self, frame: &[u8]) -> StorageResult<u64> {
        let mut inner = self.inner.lock();

        // Append mode: the kernel places this at the end of the file no
        // matter where the read cursor sits.
        inner
            .file
            .write_all(frame)
            .map_err(|e| annotate(&self.path, e))?;

        let offset = inner.len;
        inner.len += frame.len() as u64;
        Ok(offset)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> StorageResult<()> {
        let mut inner = self.inner.lock();
        let wanted = buf.len();

        if offset + wanted as u64 > inner.len {
            return Err(StorageError::ShortRead {
                offset,
                wanted,
                available: inner.len.saturating_sub(offset),
            });
        }
        if wanted == 0 {
            return Ok(());
        }

        inner
            .file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| annotate(&self.path, e))?;
        inner
            .file
            .read_exact(buf)
            .map_err(|e| annotate(&self.path, e))?;
        Ok(())
    }

    fn len(&self) -> StorageResult<u64> {
        Ok(self.inner.lock().len)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let inner = self.inner.lock();
        inner.file.sync_all().map_err(|e| annotate(&self.path, e))?;
        Ok(())
    }
}

fn annotate(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("wal.log")).unwrap();

        assert_eq!(log.append(b"frame one").unwrap(), 0);
        assert_eq!(log.append(b"frame two").unwrap(), 9);

        let mut buf = [0u8; 9];
        log.read_exact_at(9, &mut buf).unwrap();
        assert_eq!(&buf, b"frame two");
    }

    #[test]
    fn reopening_resumes_at_the_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wal.log");

        {
            let mut log = FileLog::open(&path).unwrap();
            log.append(b"durable").unwrap();
            log.flush().unwrap();
        }

        let mut log = FileLog::open(&path).unwrap();
        assert_eq!(log.len().unwrap(), 7);
        assert_eq!(log.append(b"!").unwrap(), 7);
        assert_eq!(log.read_to_end().unwrap(), b"durable!");
    }

    #[test]
    fn reads_do_not_disturb_the_append_position() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("wal.log")).unwrap();
        log.append(b"aaaa").unwrap();

        // Reposition the cursor via a read, then keep appending.
        let mut buf = [0u8; 2];
        log.read_exact_at(0, &mut buf).unwrap();
        assert_eq!(log.append(b"bbbb").unwrap(), 4);
        assert_eq!(log.read_to_end().unwrap(), b"aaaabbbb");
    }

    #[test]
    fn short_read_past_the_tail() {
        let dir = tempdir().unwrap();
        let mut log = FileLog::open(dir.path().join("wal.log")).unwrap();
        log.append(b"abc").unwrap();

        let mut buf = [0u8; 5];
        let err = log.read_exact_at(1, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            StorageError::ShortRead {
                offset: 1,
                wanted: 5,
                available: 2,
            }
        ));
    }

    #[test]
    fn open_creates_missing_parent_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/deeper/wal.log");

        let log = FileLog::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(log.path(), path);
        assert!(log.is_empty().unwrap());
    }

    #[test]
    fn io_errors_carry_the_log_path() {
        // Opening a path whose parent is a file, not a directory.
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let err = FileLog::open(blocker.join("wal.log")).unwrap_err();
        assert!(err.to_string().contains("wal.log"));
    }
}
