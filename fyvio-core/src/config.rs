//! Centralized configuration for Fyvio.
//!
//! All tunable parameters are defined here to avoid hard-coded values
//! scattered throughout the codebase.

use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;

use tracing::Level;

use crate::chunk::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A setting holds a value that cannot be used.
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue {
        /// Name of the offending setting
        key: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Central configuration for all Fyvio components.
#[derive(Debug, Clone, Default)]
pub struct FyvioConfig {
    pub server: ServerConfig,
    pub streaming: StreamingConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port to bind
    pub port: u16,
    /// Public base URL used when printing stream links
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            base_url: "http://127.0.0.1:8000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Socket address string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the public link for a token and suggested file name.
    pub fn stream_url(&self, token: &str, file_name: &str) -> String {
        format!(
            "{}/stream/{}/{}",
            self.base_url.trim_end_matches('/'),
            token,
            urlencoding::encode(file_name)
        )
    }
}

/// Chunked streaming configuration.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Size of each backend read
    pub chunk_size: NonZeroU64,
    /// Log which connection serves each client
    pub multi_client: bool,
    /// Resolved file properties kept per streamer
    pub properties_cache_capacity: NonZeroUsize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            multi_client: false,
            properties_cache_capacity: NonZeroUsize::new(1024).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Where and how loudly the process logs.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Console verbosity; `RUST_LOG` directives are added on top
    pub console_level: Level,
    /// Directory holding the per-run log file
    pub logs_dir: PathBuf,
    /// Log file name, recreated on every start
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: Level::INFO,
            logs_dir: PathBuf::from("logs"),
            file_name: "fyvio-last-run.log".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Full path of the per-run log file.
    pub fn log_file_path(&self) -> PathBuf {
        self.logs_dir.join(&self.file_name)
    }
}

impl FyvioConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored with a warning so a typo in one
    /// variable does not prevent startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("FYVIO_HOST") {
            config.server.host = host;
        }

        if let Some(port) = parse_env::<u16>("FYVIO_PORT") {
            config.server.port = port;
        }

        if let Ok(base_url) = std::env::var("FYVIO_BASE_URL") {
            config.server.base_url = base_url.trim_end_matches('/').to_string();
        }

        if let Some(chunk_size) = parse_env::<NonZeroU64>("FYVIO_CHUNK_SIZE") {
            config.streaming.chunk_size = chunk_size;
        }

        if let Some(multi_client) = parse_env::<bool>("FYVIO_MULTI_CLIENT") {
            config.streaming.multi_client = multi_client;
        }

        if let Some(level) = parse_env::<Level>("FYVIO_LOG_LEVEL") {
            config.logging.console_level = level;
        }

        if let Ok(logs_dir) = std::env::var("FYVIO_LOGS_DIR") {
            config.logging.logs_dir = PathBuf::from(logs_dir);
        }

        config
    }

    /// Checks cross-field constraints that types alone cannot express.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidValue` - Base URL is not an absolute http(s) URL,
    ///   or chunk size exceeds [`MAX_CHUNK_SIZE`]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.streaming.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidValue {
                key: "chunk_size",
                reason: format!(
                    "{} bytes exceeds the {} byte limit",
                    self.streaming.chunk_size, MAX_CHUNK_SIZE
                ),
            });
        }


        let url = url::Url::parse(&self.server.base_url).map_err(|e| ConfigError::InvalidValue {
            key: "base_url",
            reason: e.to_string(),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                key: "base_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        Ok(())
    }

    /// Creates a configuration suited to tests: small chunks keep fixtures tiny.
    pub fn for_testing(chunk_size: NonZeroU64) -> Self {
        Self {
            streaming: StreamingConfig {
                chunk_size,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}
