//! Storage adapter error types
//!
//! Error definitions with transient/permanent classification.

use std::path::PathBuf;

use thiserror::Error;
use vsc_core::CoreError;

/// Error that can occur while driving a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A local filesystem call failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Changing ownership failed.
    #[error("chown {uid}:{gid} on {path} failed: {source}")]
    Ownership {
        path: PathBuf,
        uid: u32,
        gid: u32,
        #[source]
        source: nix::errno::Errno,
    },

    /// An existing path is not a directory.
    #[error("{path} exists but is not a directory")]
    NotADirectory { path: PathBuf },

    /// A management command could not be started.
    #[error("failed to run {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A management command exited with a non-zero status.
    #[error("{program} {args} exited with status {status}: {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        status: i32,
        stderr: String,
    },

    /// The fileset name cannot be used on this backend.
    #[error("invalid fileset '{name}': {reason}")]
    InvalidFileset { name: String, reason: String },

    /// The adapter was asked about a filesystem it does not manage.
    #[error("filesystem '{requested}' is not managed by this backend ({managed})")]
    FilesystemMismatch { requested: String, managed: String },

    /// No path template is configured for the requested kind.
    #[error("storage '{storage}' has no {kind} path template")]
    MissingTemplate { storage: String, kind: String },

    /// A path template or rendered path is unusable.
    #[error("invalid path template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// A storage name is not configured.
    #[error("unknown storage: {name}")]
    UnknownStorage { name: String },

    /// Identifier validation failed.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StorageError {
    /// Check if this error is transient and the operation could be retried.
    ///
    /// Management commands on a busy cluster filesystem regularly fail with
    /// lock or timeout errors; those are transient. Configuration errors never are.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            StorageError::Ownership { source, .. } => {
                matches!(source, nix::errno::Errno::EINTR | nix::errno::Errno::EAGAIN)
            }
            StorageError::CommandSpawn { .. } => true,
            StorageError::CommandFailed { stderr, .. } => {
                let stderr = stderr.to_lowercase();
                stderr.contains("timed out") || stderr.contains("try again") || stderr.contains("busy")
            }
            _ => false,
        }
    }

    /// Check if this error is permanent and retry won't help.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        !self.is_transient()
    }

    /// Get an error code for classification.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            StorageError::Io { .. } => "IO_ERROR",
            StorageError::Ownership { .. } => "OWNERSHIP_FAILED",
            StorageError::NotADirectory { .. } => "NOT_A_DIRECTORY",
            StorageError::CommandSpawn { .. } => "COMMAND_SPAWN_FAILED",
            StorageError::CommandFailed { .. } => "COMMAND_FAILED",
            StorageError::InvalidFileset { .. } => "INVALID_FILESET",
            StorageError::FilesystemMismatch { .. } => "FILESYSTEM_MISMATCH",
            StorageError::MissingTemplate { .. } => "MISSING_TEMPLATE",
            StorageError::InvalidTemplate { .. } => "INVALID_TEMPLATE",
            StorageError::UnknownStorage { .. } => "UNKNOWN_STORAGE",
            StorageError::Core(_) => "INVALID_IDENTIFIER",
        }
    }

    // Convenience constructors

    /// Create an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an invalid fileset error.
    pub fn invalid_fileset(name: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::InvalidFileset {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid template error.
    pub fn invalid_template(template: impl Into<String>, reason: impl Into<String>) -> Self {
        StorageError::InvalidTemplate {
            template: template.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
