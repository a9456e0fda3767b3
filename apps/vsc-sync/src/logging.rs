//! Tracing subscriber setup.
//!
//! `json` emits flattened events with target, file and line for log
//! aggregation; `pretty` is the human format. `RUST_LOG` takes precedence over
//! the configured directive.

use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{CliError, CliResult};

/// Build the filter from `RUST_LOG`, else from `directive`.
pub fn build_filter(directive: &str) -> CliResult<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|e| CliError::Logging(format!("invalid filter '{directive}': {e}")))
}

/// Install the global subscriber.
///
/// `level_override` replaces the configured directive (used by `--debug`).
pub fn init_logging(config: &LoggingConfig, level_override: Option<&str>) -> CliResult<()> {
    let directive = level_override.unwrap_or(&config.level);
    let filter_layer = build_filter(directive)?;

    let (writer, ansi) = match &config.file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| CliError::Logging(format!("cannot open {}: {e}", path.display())))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let (json_layer, pretty_layer) = match config.format {
        LogFormat::Json => (
            Some(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(true)
                    .with_line_number(true)
                    .flatten_event(true)
                    .with_writer(writer),
            ),
            None,
        ),
        LogFormat::Pretty => (
            None,
            Some(
                fmt::layer()
                    .with_target(false)
                    .with_ansi(ansi)
                    .with_writer(writer),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(json_layer)
        .with(pretty_layer)
        .with(filter_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    tracing::debug!(filter = %directive, format = ?config.format, "Logging initialized");
    Ok(())
}
