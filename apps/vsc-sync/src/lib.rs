//! vsc-sync
//!
//! Command-line surface of the synchroniser: configuration loading, logging
//! setup, and the run and `--nagios` entry points.

pub mod config;
pub mod error;
pub mod logging;
pub mod run;

pub use config::{ConfigError, SyncConfig, DEFAULT_CONFIG_PATH};
pub use error::{CliError, CliResult};
