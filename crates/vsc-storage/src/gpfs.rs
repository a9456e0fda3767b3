//! GPFS (Spectrum Scale) adapter.
//!
//! Filesets are managed with `mmlsfileset`, `mmcrfileset`, `mmlinkfileset` and
//! `mmsetquota`. Limits are passed in KiB with an explicit `K` suffix.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::command::{run_checked, CommandRunner};
use crate::definition::StorageDefinition;
use crate::error::{StorageError, StorageResult};
use crate::posix;
use crate::traits::StorageBackend;
use crate::types::BackendKind;
use crate::units::block_limits_kib;

const MMLSFILESET: &str = "mmlsfileset";
const MMCRFILESET: &str = "mmcrfileset";
const MMLINKFILESET: &str = "mmlinkfileset";
const MMSETQUOTA: &str = "mmsetquota";

/// Adapter for one GPFS filesystem.
pub struct GpfsBackend {
    definition: Arc<StorageDefinition>,
    runner: Arc<dyn CommandRunner>,
}

impl GpfsBackend {
    pub fn new(definition: Arc<StorageDefinition>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { definition, runner }
    }

    fn device(&self) -> &str {
        &self.definition.filesystem
    }

    fn block_arg(soft: u64, hard: u64) -> String {
        let (soft_kib, hard_kib) = block_limits_kib(soft, hard);
        format!("{soft_kib}K:{hard_kib}K")
    }
}

#[async_trait]
impl StorageBackend for GpfsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpfs
    }

    fn display_name(&self) -> &str {
        &self.definition.name
    }

    async fn fileset_exists(&self, filesystem: &str, name: &str) -> StorageResult<bool> {
        if filesystem != self.device() {
            return Err(StorageError::FilesystemMismatch {
                requested: filesystem.to_string(),
                managed: self.device().to_string(),
            });
        }
        let args = vec![filesystem.to_string(), name.to_string()];
        let output = self.runner.run(MMLSFILESET, &args).await?;
        if output.success() {
            return Ok(true);
        }
        let stderr = output.stderr.to_lowercase();
        if stderr.contains("does not exist") || stderr.contains("not found") {
            return Ok(false);
        }
        Err(StorageError::CommandFailed {
            program: MMLSFILESET.to_string(),
            args: args.join(" "),
            status: output.status,
            stderr: output.stderr.trim().to_string(),
        })
    }

    async fn create_directory_hierarchy(&self, path: &Path) -> StorageResult<()> {
        posix::create_dir_all(path).await
    }

    async fn create_fileset(&self, path: &Path, name: &str) -> StorageResult<()> {
        // the junction itself must not exist, its parent must
        if let Some(parent) = path.parent() {
            posix::create_dir_all(parent).await?;
        }
        run_checked(
            self.runner.as_ref(),
            MMCRFILESET,
            &[
                self.device().to_string(),
                name.to_string(),
                "--inode-space".to_string(),
                "new".to_string(),
            ],
        )
        .await?;
        run_checked(
            self.runner.as_ref(),
            MMLINKFILESET,
            &[
                self.device().to_string(),
                name.to_string(),
                "-J".to_string(),
                path.display().to_string(),
            ],
        )
        .await?;
        info!(storage = %self.definition.name, fileset = name, path = %path.display(), "Created GPFS fileset");
        Ok(())
    }

    async fn set_owner(&self, uid: u32, gid: u32, path: &Path) -> StorageResult<()> {
        posix::set_owner(path, uid, gid)
    }

    async fn set_mode(&self, mode: u32, path: &Path) -> StorageResult<()> {
        posix::set_mode(path, mode).await
    }

    async fn set_fileset_quota(
        &self,
        soft: u64,
        path: &Path,
        name: &str,
        hard: u64,
    ) -> StorageResult<()> {
        let block = Self::block_arg(soft, hard);
        debug!(fileset = name, path = %path.display(), block = %block, "Setting fileset quota");
        run_checked(
            self.runner.as_ref(),
            MMSETQUOTA,
            &[
                format!("{}:{name}", self.device()),
                "--block".to_string(),
                block,
            ],
        )
        .await
        .map(|_| ())
    }

    async fn set_fileset_grace(&self, path: &Path, grace: Duration) -> StorageResult<()> {
        debug!(path = %path.display(), grace_secs = grace.as_secs(), "Setting fileset grace");
        run_checked(
            self.runner.as_ref(),
            MMSETQUOTA,
            &[
                self.device().to_string(),
                "--grace".to_string(),
                "fileset".to_string(),
                "--block".to_string(),
                format!("{}seconds", grace.as_secs()),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn create_owned_directory(
        &self,
        path: &Path,
        mode: u32,
        uid: u32,
        gid: u32,
        override_permissions: bool,
    ) -> StorageResult<bool> {
        posix::create_owned_directory(path, mode, uid, gid, override_permissions).await
    }

    async fn set_user_quota(
        &self,
        soft: u64,
        uid: u32,
        path: &Path,
        hard: u64,
    ) -> StorageResult<()> {
        // user quota is scoped to the fileset linked at `path`
        let fileset = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                StorageError::invalid_fileset(path.display().to_string(), "path has no fileset name")
            })?;
        run_checked(
            self.runner.as_ref(),
            MMSETQUOTA,
            &[
                format!("{}:{fileset}", self.device()),
                "--user".to_string(),
                uid.to_string(),
                "--block".to_string(),
                Self::block_arg(soft, hard),
            ],
        )
        .await
        .map(|_| ())
    }

    async fn create_owned_file(
        &self,
        path: &Path,
        contents: &[u8],
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> StorageResult<bool> {
        posix::create_owned_file(path, contents, mode, uid, gid).await
    }
}
