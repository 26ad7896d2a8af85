//! Engine configuration.

use std::path::PathBuf;

/// Configuration for opening an engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Whether mutations are written to the WAL before applying.
    pub enable_wal: bool,

    /// Path of the WAL file. With `enable_wal` and no path, the log is
    /// kept in memory (useful for tests).
    pub wal_path: Option<PathBuf>,

    /// Whether WAL record bodies are zstd-compressed.
    pub enable_compression: bool,

    /// zstd level used when compression is enabled.
    pub compression_level: i32,

    /// Whether every WAL append is flushed to durable storage.
    pub sync_on_write: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_wal: false,
            wal_path: None,
            enable_compression: false,
            compression_level: 3,
            sync_on_write: true,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the WAL.
    #[must_use]
    pub const fn enable_wal(mut self, value: bool) -> Self {
        self.enable_wal = value;
        self
    }

    /// Sets the WAL file path (implies `enable_wal`).
    #[must_use]
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self.enable_wal = true;
        self
    }

    /// Enables or disables WAL compression.
    #[must_use]
    pub const fn enable_compression(mut self, value: bool) -> Self {
        self.enable_compression = value;
        self
    }

    /// Sets the zstd compression level.
    #[must_use]
    pub const fn compression_level(mut self, level: i32) -> Self {
        self.compression_level = level;
        self
    }

    /// Sets whether appends flush to durable storage.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert!(!config.enable_wal);
        assert!(config.wal_path.is_none());
        assert!(config.sync_on_write);
    }

    #[test]
    fn builder() {
        let config = EngineConfig::new()
            .wal_path("/tmp/syncopate.wal")
            .enable_compression(true)
            .compression_level(7)
            .sync_on_write(false);

        assert!(config.enable_wal);
        assert_eq!(config.compression_level, 7);
        assert!(!config.sync_on_write);
    }
}
