//! # VSC Storage
//!
//! Storage backend adapters for the VSC storage synchronisation.
//!
//! The reconciler drives every filesystem through the [`StorageBackend`]
//! capability trait:
//!
//! - [`GpfsBackend`] - GPFS filesets through the `mm*` commands
//! - [`LustreBackend`] - Lustre project directories through `lfs`
//! - [`DryRunBackend`] - logs mutations instead of performing them
//!
//! Quota values cross the trait in bytes and are converted to KiB at the
//! adapter boundary ([`units`]).
//!
//! ## Example
//!
//! ```ignore
//! use vsc_storage::prelude::*;
//!
//! let registry = StorageRegistry::from_definitions(
//!     config.storages,
//!     Arc::new(SystemCommandRunner::with_bin_dir("/usr/lpp/mmfs/bin")),
//!     dry_run,
//! )?;
//! let data = registry.get("VSC_DATA")?;
//! if !data.backend.fileset_exists(&data.definition.filesystem, "gvo00012").await? {
//!     data.backend.create_fileset(&path, "gvo00012").await?;
//! }
//! ```

pub mod command;
pub mod definition;
pub mod dry_run;
pub mod error;
pub mod gpfs;
pub mod lustre;
pub mod posix;
pub mod registry;
pub mod traits;
pub mod types;
pub mod units;

pub use command::{CommandOutput, CommandRunner, SystemCommandRunner};
pub use definition::{PathTemplate, StorageDefinition};
pub use dry_run::DryRunBackend;
pub use error::{StorageError, StorageResult};
pub use gpfs::GpfsBackend;
pub use lustre::LustreBackend;
pub use registry::{build_backend, StorageHandle, StorageRegistry};
pub use traits::StorageBackend;
pub use types::{BackendKind, PathKind};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::command::{CommandOutput, CommandRunner, SystemCommandRunner};
    pub use crate::definition::{PathTemplate, StorageDefinition};
    pub use crate::error::{StorageError, StorageResult};
    pub use crate::registry::{StorageHandle, StorageRegistry};
    pub use crate::traits::StorageBackend;
    pub use crate::types::{BackendKind, PathKind};
}
