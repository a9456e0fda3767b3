//! Storage backend capability trait
//!
//! One uniform interface over every backend family. The reconciler only ever
//! sees `dyn StorageBackend`; the family is chosen once when the registry is
//! built.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::error::StorageResult;
use crate::types::BackendKind;

/// Filesystem management operations.
///
/// Every operation is idempotent at the call level except
/// [`create_fileset`](StorageBackend::create_fileset), which callers guard
/// with [`fileset_exists`](StorageBackend::fileset_exists). Quota values are
/// in bytes; adapters convert to their native unit. There is no implicit
/// retry.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Get the backend family.
    fn kind(&self) -> BackendKind;

    /// Get the display name for this backend instance.
    fn display_name(&self) -> &str;

    /// Whether a fileset called `name` exists on `filesystem`.
    async fn fileset_exists(&self, filesystem: &str, name: &str) -> StorageResult<bool>;

    /// Create every missing directory up to and including `path`.
    async fn create_directory_hierarchy(&self, path: &Path) -> StorageResult<()>;

    /// Create a fileset named `name` at `path`.
    ///
    /// Does not check for an existing fileset.
    async fn create_fileset(&self, path: &Path, name: &str) -> StorageResult<()>;

    /// Change ownership of `path`.
    async fn set_owner(&self, uid: u32, gid: u32, path: &Path) -> StorageResult<()>;

    /// Change the permission bits of `path`.
    async fn set_mode(&self, mode: u32, path: &Path) -> StorageResult<()>;

    /// Set the block quota of a fileset, in bytes.
    async fn set_fileset_quota(
        &self,
        soft: u64,
        path: &Path,
        name: &str,
        hard: u64,
    ) -> StorageResult<()>;

    /// Set the block grace period for filesets on the filesystem holding `path`.
    async fn set_fileset_grace(&self, path: &Path, grace: Duration) -> StorageResult<()>;

    /// Create an owned directory if absent.
    ///
    /// An existing directory keeps its ownership and mode unless
    /// `override_permissions` is set. Returns whether the directory was created.
    async fn create_owned_directory(
        &self,
        path: &Path,
        mode: u32,
        uid: u32,
        gid: u32,
        override_permissions: bool,
    ) -> StorageResult<bool>;

    /// Set the block quota of one user inside the fileset at `path`, in bytes.
    async fn set_user_quota(&self, soft: u64, uid: u32, path: &Path, hard: u64)
        -> StorageResult<()>;

    /// Create an owned regular file if absent. Existing files are never
    /// touched. Returns whether the file was created.
    async fn create_owned_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> StorageResult<bool>;
}
