//! Provisioning and pass-level error types.

use thiserror::Error;
use vsc_accountpage::SourceError;
use vsc_core::{CoreError, EntityKind, VscId};
use vsc_storage::StorageError;

use crate::engine::PassPhase;

/// Error while provisioning one entity. Never aborts a pass.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Storage backend failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Account page failure.
    #[error("account page error: {0}")]
    Source(#[from] SourceError),

    /// Invalid identifier or quota value.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// No quota in the account page and no default for the storage.
    #[error("no quota for {entity} on {storage} and no default configured")]
    MissingQuota { entity: VscId, storage: String },
}

impl ProvisionError {
    /// Whether the same step could succeed on a later run without changes.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            ProvisionError::Storage(e) => e.is_transient(),
            ProvisionError::Source(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Error that aborts a whole pass before any entity is processed.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A requested entity kind has no configuration.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The source clock could not be read.
    #[error("cannot read the account page clock: {0}")]
    ServerTime(#[source] SourceError),

    /// The change set could not be read.
    #[error("cannot fetch changed {kind} entities: {source}")]
    FetchChanges {
        kind: EntityKind,
        #[source]
        source: SourceError,
    },

    /// Quota changes could not be read.
    #[error("cannot fetch {kind} quota changes on {storage}: {source}")]
    FetchQuota {
        kind: EntityKind,
        storage: String,
        #[source]
        source: SourceError,
    },
}

impl EngineError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        EngineError::Configuration {
            message: message.into(),
        }
    }

    /// The phase in which this error aborts a pass.
    #[must_use]
    pub fn phase(&self) -> PassPhase {
        match self {
            EngineError::Configuration { .. } => PassPhase::Init,
            EngineError::ServerTime(_)
            | EngineError::FetchChanges { .. }
            | EngineError::FetchQuota { .. } => PassPhase::FetchChanges,
        }
    }
}

/// Result type for pass-level operations.
pub type EngineResult<T> = Result<T, EngineError>;
