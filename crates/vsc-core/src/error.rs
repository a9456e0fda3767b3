//! Error Types
//!
//! Validation failures for the shared records. Anything that reaches the
//! storage layer has already passed through one of these checks.

use thiserror::Error;

/// Result alias used across `vsc-core`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Validation error for shared records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Identifier is empty or contains characters that are unsafe in a path.
    #[error("invalid identifier '{value}': {reason}")]
    InvalidId { value: String, reason: &'static str },

    /// Timestamp could not be parsed as a watermark.
    #[error("invalid watermark '{value}'")]
    InvalidWatermark { value: String },

    /// Quota fraction or factor outside its valid range.
    #[error("invalid quota parameter {name}={value}")]
    InvalidQuota { name: &'static str, value: String },

    /// Unknown entity kind.
    #[error("unknown entity kind '{0}', expected one of: user, project")]
    UnknownKind(String),
}
