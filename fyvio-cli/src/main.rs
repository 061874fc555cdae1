//! Fyvio CLI - Command-line interface
//!
//! Runs the streaming gateway and inspects access tokens.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use fyvio_core::tracing_setup::init_tracing;
use fyvio_core::{FyvioConfig, FyvioError};
use tracing::Level;

#[derive(Parser)]
#[command(name = "fyvio")]
#[command(about = "A range-aware media streaming gateway")]
#[command(version)]
struct Cli {
    /// Console log level (overrides FYVIO_LOG_LEVEL); the log file always captures everything
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Directory for the last-run log file (overrides FYVIO_LOGS_DIR)
    #[arg(long, global = true)]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

/// Console verbosity accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = FyvioConfig::from_env();
    if let Some(level) = cli.log_level {
        config.logging.console_level = level.into();
    }
    if let Some(logs_dir) = cli.logs_dir {
        config.logging.logs_dir = logs_dir;
    }

    if let Err(e) = init_tracing(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match commands::handle_command(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if caused_by_user(&e) {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Whether any cause in the chain is bad input rather than a runtime failure.
fn caused_by_user(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<FyvioError>()
            .is_some_and(FyvioError::is_user_error)
    })
}

#[cfg(test)]
mod tests {
    use anyhow::Context;
    use fyvio_core::{ConfigError, DecodeError};

    use super::*;

    #[test]
    fn test_bad_input_is_user_error() {
        let decode = anyhow::Error::from(FyvioError::from(DecodeError::Empty));
        assert!(caused_by_user(&decode));

        let config: anyhow::Result<()> = Err(FyvioError::from(ConfigError::InvalidValue {
            key: "chunk_size",
            reason: "too large".to_string(),
        }))
        .context("cannot start server");
        assert!(caused_by_user(&config.unwrap_err()));
    }

    #[test]
    fn test_runtime_failure_is_not_user_error() {
        let io = anyhow::Error::from(FyvioError::from(std::io::Error::other("bind failed")));
        assert!(!caused_by_user(&io));
        assert!(!caused_by_user(&anyhow::anyhow!("scan failed")));
    }

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(Level::from(LogLevel::Warn), Level::WARN);
        assert_eq!(Level::from(LogLevel::Trace), Level::TRACE);
    }
}
