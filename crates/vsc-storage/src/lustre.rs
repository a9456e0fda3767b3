//! Lustre adapter.
//!
//! Lustre has no named filesets. A "fileset" is a directory tagged with a
//! project id (`lfs project -p <id> -s`), and quota is set per project id on
//! the mount point. The project id is the numeric suffix of the fileset name
//! plus the storage's `lustre_project_id_offset` (`gvo00012` with offset
//! 900000 is project 900012).

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use vsc_core::VscId;

use crate::command::{run_checked, CommandRunner};
use crate::definition::StorageDefinition;
use crate::error::{StorageError, StorageResult};
use crate::posix;
use crate::traits::StorageBackend;
use crate::types::BackendKind;
use crate::units::block_limits_kib;

const LFS: &str = "lfs";

/// Adapter for one Lustre filesystem.
pub struct LustreBackend {
    definition: Arc<StorageDefinition>,
    runner: Arc<dyn CommandRunner>,
}

impl LustreBackend {
    pub fn new(definition: Arc<StorageDefinition>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { definition, runner }
    }

    /// Project id used for the fileset `name`.
    pub fn project_id(&self, name: &str) -> StorageResult<u32> {
        let suffix = VscId::new(name)?
            .numeric_suffix()
            .ok_or_else(|| StorageError::invalid_fileset(name, "no numeric suffix"))?;
        suffix
            .checked_add(self.definition.lustre_project_id_offset)
            .ok_or_else(|| StorageError::invalid_fileset(name, "project id overflows"))
    }

    fn mount(&self) -> String {
        self.definition.mount_point.display().to_string()
    }

    async fn lfs(&self, args: Vec<String>) -> StorageResult<String> {
        run_checked(self.runner.as_ref(), LFS, &args)
            .await
            .map(|output| output.stdout)
    }
}

#[async_trait]
impl StorageBackend for LustreBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Lustre
    }

    fn display_name(&self) -> &str {
        &self.definition.name
    }

    async fn fileset_exists(&self, filesystem: &str, name: &str) -> StorageResult<bool> {
        if filesystem != self.definition.filesystem {
            return Err(StorageError::FilesystemMismatch {
                requested: filesystem.to_string(),
                managed: self.definition.filesystem.clone(),
            });
        }
        let project_id = self.project_id(name)?;
        let stdout = self
            .lfs(vec![
                "find".to_string(),
                self.mount(),
                "--maxdepth".to_string(),
                self.definition.lustre_search_depth.to_string(),
                "--type".to_string(),
                "d".to_string(),
                "--projid".to_string(),
                project_id.to_string(),
            ])
            .await?;
        Ok(stdout.lines().any(|line| !line.trim().is_empty()))
    }

    async fn create_directory_hierarchy(&self, path: &Path) -> StorageResult<()> {
        posix::create_dir_all(path).await
    }

    async fn create_fileset(&self, path: &Path, name: &str) -> StorageResult<()> {
        let project_id = self.project_id(name)?;
        posix::create_dir_all(path).await?;
        self.lfs(vec![
            "project".to_string(),
            "-p".to_string(),
            project_id.to_string(),
            "-s".to_string(),
            "-r".to_string(),
            path.display().to_string(),
        ])
        .await?;
        info!(storage = %self.definition.name, fileset = name, project_id, path = %path.display(), "Created Lustre project");
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
        let project_id = self.project_id(name)?;
        let (soft_kib, hard_kib) = block_limits_kib(soft, hard);
        debug!(fileset = name, project_id, path = %path.display(), soft_kib, hard_kib, "Setting project quota");
        self.lfs(vec![
            "setquota".to_string(),
            "-p".to_string(),
            project_id.to_string(),
            "-b".to_string(),
            format!("{soft_kib}k"),
            "-B".to_string(),
            format!("{hard_kib}k"),
            self.mount(),
        ])
        .await
        .map(|_| ())
    }

    async fn set_fileset_grace(&self, path: &Path, grace: Duration) -> StorageResult<()> {
        debug!(path = %path.display(), grace_secs = grace.as_secs(), "Setting project grace");
        self.lfs(vec![
            "setquota".to_string(),
            "-t".to_string(),
            "-p".to_string(),
            "--block-grace".to_string(),
            grace.as_secs().to_string(),
            self.mount(),
        ])
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
        _soft: u64,
        uid: u32,
        path: &Path,
        _hard: u64,
    ) -> StorageResult<()> {
        warn!(
            storage = %self.definition.name,
            uid,
            path = %path.display(),
            "Per-user quota inside a Lustre project is not supported, skipping"
        );
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
        posix::create_owned_file(path, contents, mode, uid, gid).await
    }
}
