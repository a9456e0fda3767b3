//! Dry-run wrapper.
//!
//! Reads go to the wrapped backend; every mutation is logged and skipped.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::error::StorageResult;
use crate::posix;
use crate::traits::StorageBackend;
use crate::types::BackendKind;

/// A backend that never mutates.
pub struct DryRunBackend {
    inner: Arc<dyn StorageBackend>,
}

impl DryRunBackend {
    pub fn new(inner: Arc<dyn StorageBackend>) -> Self {
        Self { inner }
    }

    /// Get a reference to the wrapped backend.
    pub fn inner(&self) -> &Arc<dyn StorageBackend> {
        &self.inner
    }
}

#[async_trait]
impl StorageBackend for DryRunBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn display_name(&self) -> &str {
        self.inner.display_name()
    }

    async fn fileset_exists(&self, filesystem: &str, name: &str) -> StorageResult<bool> {
        self.inner.fileset_exists(filesystem, name).await
    }

    async fn create_directory_hierarchy(&self, path: &Path) -> StorageResult<()> {
        info!(path = %path.display(), "(dryrun) create directory hierarchy");
        Ok(())
    }

    async fn create_fileset(&self, path: &Path, name: &str) -> StorageResult<()> {
        info!(path = %path.display(), fileset = name, "(dryrun) create fileset");
        Ok(())
    }

    async fn set_owner(&self, uid: u32, gid: u32, path: &Path) -> StorageResult<()> {
        info!(path = %path.display(), uid, gid, "(dryrun) set owner");
        Ok(())
    }

    async fn set_mode(&self, mode: u32, path: &Path) -> StorageResult<()> {
        info!(path = %path.display(), mode = %format_args!("{mode:o}"), "(dryrun) set mode");
        Ok(())
    }

    async fn set_fileset_quota(
        &self,
        soft: u64,
        path: &Path,
        name: &str,
        hard: u64,
    ) -> StorageResult<()> {
        info!(path = %path.display(), fileset = name, soft, hard, "(dryrun) set fileset quota");
        Ok(())
    }

    async fn set_fileset_grace(&self, path: &Path, grace: Duration) -> StorageResult<()> {
        info!(path = %path.display(), grace_secs = grace.as_secs(), "(dryrun) set fileset grace");
        Ok(())
    }

    async fn create_owned_directory(
        &self,
        path: &Path,
        mode: u32,
        uid: u32,
        gid: u32,
        override_permissions: bool,
    ) -> StorageResult<bool> {
        info!(
            path = %path.display(),
            mode = %format_args!("{mode:o}"),
            uid,
            gid,
            override_permissions,
            "(dryrun) create owned directory"
        );
        Ok(!posix::path_exists(path).await?)
    }

    async fn set_user_quota(
        &self,
        soft: u64,
        uid: u32,
        path: &Path,
        hard: u64,
    ) -> StorageResult<()> {
        info!(path = %path.display(), uid, soft, hard, "(dryrun) set user quota");
        Ok(())
    }

    async fn create_owned_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> StorageResult<bool> {
        info!(
            path = %path.display(),
            bytes = contents.len(),
            mode = %format_args!("{mode:o}"),
            uid,
            gid,
            "(dryrun) create owned file"
        );
        Ok(!posix::path_exists(path).await?)
    }
}
