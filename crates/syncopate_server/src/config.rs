//! Server configuration.

use std::env;
use std::path::PathBuf;
use syncopate_core::EngineConfig;

/// Configuration for the request handler layer.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the transport is expected to bind.
    pub port: u16,
    /// Debug mode: internal underscore fields appear in responses.
    pub debug: bool,
    /// Log level label exposed on the settings surface.
    pub log_level: String,
    /// Whether the engine writes a WAL.
    pub enable_wal: bool,
    /// WAL file path (in-memory log when unset).
    pub wal_path: Option<PathBuf>,
    /// Whether WAL record bodies are zstd-compressed.
    pub enable_zstd: bool,
    /// Whether log output is colorized.
    pub colorized_logs: bool,
    /// Deployment label; falls back to debug/production when unset.
    pub environment: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            debug: false,
            log_level: "info".to_string(),
            enable_wal: false,
            wal_path: None,
            enable_zstd: false,
            colorized_logs: true,
            environment: None,
        }
    }
}

impl ServerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads configuration from the environment.
    ///
    /// Recognized variables: `SYNCOPATE_PORT`, `SYNCOPATE_DEBUG`,
    /// `SYNCOPATE_LOG_LEVEL`, `SYNCOPATE_ENABLE_WAL`,
    /// `SYNCOPATE_WAL_PATH`, `SYNCOPATE_ENABLE_ZSTD`,
    /// `SYNCOPATE_COLORIZED_LOGS`, and `APP_ENV` / `ENV` for the
    /// deployment label. Malformed values fall back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            port: env::var("SYNCOPATE_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            debug: env_flag("SYNCOPATE_DEBUG"),
            log_level: env::var("SYNCOPATE_LOG_LEVEL").unwrap_or(defaults.log_level),
            enable_wal: env_flag("SYNCOPATE_ENABLE_WAL"),
            wal_path: env::var("SYNCOPATE_WAL_PATH").ok().map(PathBuf::from),
            enable_zstd: env_flag("SYNCOPATE_ENABLE_ZSTD"),
            colorized_logs: env::var("SYNCOPATE_COLORIZED_LOGS")
                .map(|v| v != "false")
                .unwrap_or(defaults.colorized_logs),
            environment: env::var("APP_ENV").ok().or_else(|| env::var("ENV").ok()),
        }
    }

    /// Sets debug mode.
    #[must_use]
    pub const fn debug(mut self, value: bool) -> Self {
        self.debug = value;
        self
    }

    /// Sets the port.
    #[must_use]
    pub const fn port(mut self, value: u16) -> Self {
        self.port = value;
        self
    }

    /// Enables the WAL with a file path.
    #[must_use]
    pub fn wal_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.wal_path = Some(path.into());
        self.enable_wal = true;
        self
    }

    /// Enables or disables WAL compression.
    #[must_use]
    pub const fn enable_zstd(mut self, value: bool) -> Self {
        self.enable_zstd = value;
        self
    }

    /// The deployment environment label.
    ///
    /// Falls back to `development` in debug mode and `production`
    /// otherwise.
    #[must_use]
    pub fn environment(&self) -> String {
        if let Some(env) = &self.environment {
            return env.clone();
        }
        if self.debug {
            "development".to_string()
        } else {
            "production".to_string()
        }
    }

    /// The engine configuration implied by this server configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        let mut config = EngineConfig::new()
            .enable_wal(self.enable_wal)
            .enable_compression(self.enable_zstd);
        if let Some(path) = &self.wal_path {
            config = config.wal_path(path.clone());
        }
        config
    }
}

fn env_flag(name: &str) -> bool {
    env::var(name).map(|v| v == "true" || v == "1").unwrap_or(false)
}
