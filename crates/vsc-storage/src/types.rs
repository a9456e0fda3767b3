//! Storage type definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Family of storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// IBM Spectrum Scale (GPFS), driven through the `mm*` commands.
    Gpfs,
    /// Lustre with project quota, driven through `lfs`.
    Lustre,
}

impl BackendKind {
    /// Get all available backend kinds.
    #[must_use]
    pub fn all() -> &'static [BackendKind] {
        &[BackendKind::Gpfs, BackendKind::Lustre]
    }

    /// Get the string representation used in configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Gpfs => "gpfs",
            BackendKind::Lustre => "lustre",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ParseBackendKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gpfs" => Ok(BackendKind::Gpfs),
            "lustre" => Ok(BackendKind::Lustre),
            _ => Err(ParseBackendKindError(s.to_string())),
        }
    }
}

/// Error parsing backend kind from string.
#[derive(Debug, Clone)]
pub struct ParseBackendKindError(String);

impl fmt::Display for ParseBackendKindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid backend kind '{}', expected one of: gpfs, lustre",
            self.0
        )
    }
}

impl std::error::Error for ParseBackendKindError {}

/// Which path template of a storage definition to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// Per-user directory (home or data).
    User,
    /// Per-project fileset.
    Project,
}

impl PathKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PathKind::User => "user",
            PathKind::Project => "project",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
