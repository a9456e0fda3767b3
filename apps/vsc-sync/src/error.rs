//! CLI error types and exit codes

use thiserror::Error;
use vsc_accountpage::SourceError;
use vsc_provisioning::CoordinatorError;
use vsc_storage::StorageError;

use crate::config::ConfigError;

/// Exit codes for the CLI
/// - 0: Success (or OK / WARNING for a synchronisation run)
/// - 1: Setup error (configuration, logging, client, storages)
/// - 2: CRITICAL synchronisation run
/// - 3: Health cache unreadable (Nagios UNKNOWN)
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Account page client error: {0}")]
    Source(#[from] SourceError),

    #[error("Storage setup failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Health cache error: {0}")]
    Health(#[from] CoordinatorError),
}

impl CliError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_)
            | CliError::Logging(_)
            | CliError::Source(_)
            | CliError::Storage(_) => 1,
            CliError::Health(_) => 3,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {suggestion}");
            } else {
                eprintln!("\nSuggestion: {suggestion}");
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(ConfigError::Read { .. }) => {
                Some("Pass --config or set VSC_SYNC_CONFIG to the configuration file.")
            }
            CliError::Health(_) => Some("Check that a synchronisation run has completed recently."),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        let config = CliError::Config(ConfigError::Invalid {
            field: "quota.soft_fraction".to_string(),
            message: "must be in (0, 1]".to_string(),
        });
        assert_eq!(config.exit_code(), 1);
        assert_eq!(CliError::Logging("bad directive".to_string()).exit_code(), 1);

        let cache = CliError::Health(CoordinatorError::Io {
            path: PathBuf::from("/var/cache/vsc-sync/health.json"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        });
        assert_eq!(cache.exit_code(), 3);
    }

    #[test]
    fn test_display_includes_cause() {
        let err = CliError::Config(ConfigError::Invalid {
            field: "projects.prefix".to_string(),
            message: "must not be empty".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid projects.prefix: must not be empty"
        );
    }
}
