//! Process-wide logging for the gateway.
//!
//! Events go to two sinks. The console is filtered to
//! [`LoggingConfig::console_level`], with `RUST_LOG` directives layered on
//! top. The per-run log file under [`LoggingConfig::logs_dir`] keeps every
//! event down to TRACE.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber described by `config` and returns the
/// path of the log file it writes.
///
/// The file is truncated, so it only holds the current run.
///
/// # Errors
///
/// - `FyvioError::Io` - Logs directory or log file could not be created
/// - `FyvioError::Logging` - A global subscriber is already installed
pub fn init_tracing(config: &LoggingConfig) -> crate::Result<PathBuf> {
    let (path, file) = open_log_file(config)?;

    tracing_subscriber::registry()
        .with(vec![console_layer(config.console_level), file_layer(file)])
        .try_init()?;

    tracing::info!(
        "Logging to console at {} and to {}",
        config.console_level,
        path.display()
    );
    Ok(path)
}

fn open_log_file(config: &LoggingConfig) -> std::io::Result<(PathBuf, File)> {
    std::fs::create_dir_all(&config.logs_dir)?;
    let path = config.log_file_path();
    let file = File::create(&path)?;
    Ok((path, file))
}

fn console_layer(level: Level) -> BoxedLayer {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    fmt::layer().with_target(true).with_filter(filter).boxed()
}

fn file_layer(file: File) -> BoxedLayer {
    fmt::layer()
        .with_ansi(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::TRACE)
        .boxed()
}
