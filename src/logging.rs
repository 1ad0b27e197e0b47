//! Logging initialization for conductor.
//!
//! Logs go to stderr by default, or to `<root>/logs/conductor.log` when
//! `logging.to_file` is set. `RUST_LOG` overrides the configured level and
//! `--verbose` raises it to `debug`.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::conductor_config::LogFormat;
use crate::config::Config;

pub const LOG_FILE_NAME: &str = "conductor.log";

/// Result of logging initialization
pub struct LoggingHandle {
    /// Guard that must be kept alive for the duration of the program.
    /// When dropped, ensures all buffered logs are flushed.
    pub _guard: Option<WorkerGuard>,

    /// Path to the log file (only set when file logging is enabled)
    pub log_file_path: Option<PathBuf>,
}

/// Pick the filter directive: `RUST_LOG`, then `--verbose`, then the config file.
pub fn resolve_level(configured: &str, verbose: bool, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if verbose => "debug".to_string(),
        _ => configured.to_string(),
    }
}

/// Install the global subscriber.
///
/// A subscriber that is already installed (e.g. by a test harness) is left in place.
pub fn init_logging(config: &Config) -> Result<LoggingHandle> {
    let logging = &config.settings.logging;
    let level = resolve_level(&logging.level, config.verbose, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&level).unwrap_or_else(|_| EnvFilter::new("warn"));

    let (writer, guard, log_file_path) = if logging.to_file {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("Failed to create log directory: {}", config.log_dir.display())
        })?;
        let file_appender = tracing_appender::rolling::never(&config.log_dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (
            BoxMakeWriter::new(non_blocking),
            Some(guard),
            Some(config.log_dir.join(LOG_FILE_NAME)),
        )
    } else {
        (BoxMakeWriter::new(std::io::stderr), None, None)
    };

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match logging.format {
        LogFormat::Text => tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_ansi(!logging.to_file)
            .with_writer(writer)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .try_init();

    Ok(LoggingHandle {
        _guard: guard,
        log_file_path,
    })
}
