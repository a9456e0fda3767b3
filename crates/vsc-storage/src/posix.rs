//! POSIX operations shared by every backend.
//!
//! Directory and file creation, ownership and permission bits are plain
//! filesystem calls on both GPFS and Lustre.

use nix::unistd::{chown, Gid, Uid};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{StorageError, StorageResult};

/// Whether `path` exists. Broken symlinks count as absent.
pub async fn path_exists(path: &Path) -> StorageResult<bool> {
    tokio::fs::try_exists(path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

/// `mkdir -p`.
pub async fn create_dir_all(path: &Path) -> StorageResult<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::io(path, e))
}

/// `chown uid:gid path`.
pub fn set_owner(path: &Path, uid: u32, gid: u32) -> StorageResult<()> {
    chown(path, Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid))).map_err(|source| {
        StorageError::Ownership {
            path: path.to_path_buf(),
            uid,
            gid,
            source,
        }
    })
}

/// `chmod mode path`.
pub async fn set_mode(path: &Path, mode: u32) -> StorageResult<()> {
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| StorageError::io(path, e))
}

async fn apply_owner_and_mode(path: &Path, mode: u32, uid: u32, gid: u32) -> StorageResult<()> {
    set_mode(path, mode).await?;
    set_owner(path, uid, gid)
}

/// Create a directory owned by `uid:gid` with `mode`, unless it exists.
///
/// Missing parents are created with default ownership. An existing directory
/// is only re-owned when `override_permissions` is set.
pub async fn create_owned_directory(
    path: &Path,
    mode: u32,
    uid: u32,
    gid: u32,
    override_permissions: bool,
) -> StorageResult<bool> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_dir() => {
            if override_permissions {
                debug!(path = %path.display(), mode = %format_args!("{mode:o}"), uid, gid, "Re-applying ownership");
                apply_owner_and_mode(path, mode, uid, gid).await?;
            }
            return Ok(false);
        }
        Ok(_) => {
            return Err(StorageError::NotADirectory {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(StorageError::io(path, e)),
    }

    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }
    match tokio::fs::create_dir(path).await {
        Ok(()) => {}
        // lost a race against a concurrent creator; treat as pre-existing
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(StorageError::io(path, e)),
    }
    apply_owner_and_mode(path, mode, uid, gid).await?;
    debug!(path = %path.display(), mode = %format_args!("{mode:o}"), uid, gid, "Created directory");
    Ok(true)
}

/// Create a file with `contents`, owned by `uid:gid` with `mode`, unless it exists.
pub async fn create_owned_file(
    path: &Path,
    contents: &[u8],
    mode: u32,
    uid: u32,
    gid: u32,
) -> StorageResult<bool> {
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(StorageError::io(path, e)),
    };
    file.write_all(contents)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.flush().await.map_err(|e| StorageError::io(path, e))?;
    drop(file);

    apply_owner_and_mode(path, mode, uid, gid).await?;
    debug!(path = %path.display(), bytes = contents.len(), "Created file");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::{getgid, getuid};
    use std::os::unix::fs::MetadataExt;
    use tempfile::TempDir;

    fn me() -> (u32, u32) {
        (getuid().as_raw(), getgid().as_raw())
    }

    #[tokio::test]
    async fn test_create_owned_directory_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gent/vsc400/vsc40001");
        let (uid, gid) = me();

        assert!(create_owned_directory(&path, 0o700, uid, gid, false).await.unwrap());
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.mode() & 0o7777, 0o700);
        assert_eq!(meta.uid(), uid);

        assert!(!create_owned_directory(&path, 0o755, uid, gid, false).await.unwrap());
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.mode() & 0o7777, 0o700, "existing mode is kept");
    }

    #[tokio::test]
    async fn test_override_reapplies_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proj");
        let (uid, gid) = me();
        std::fs::create_dir(&path).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        assert!(!create_owned_directory(&path, 0o770, uid, gid, true).await.unwrap());
        let meta = std::fs::metadata(&path).unwrap();
        assert_eq!(meta.mode() & 0o7777, 0o770);
    }

    #[tokio::test]
    async fn test_file_in_place_of_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("occupied");
        std::fs::write(&path, b"x").unwrap();
        let (uid, gid) = me();
        let err = create_owned_directory(&path, 0o700, uid, gid, false)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotADirectory { .. }));
    }

    #[tokio::test]
    async fn test_create_owned_file_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".bashrc");
        let (uid, gid) = me();

        assert!(create_owned_file(&path, b"first", 0o644, uid, gid).await.unwrap());
        assert!(!create_owned_file(&path, b"second", 0o644, uid, gid).await.unwrap());
        assert_eq!(std::fs::read(&path).unwrap(), b"first");
        assert_eq!(std::fs::metadata(&path).unwrap().mode() & 0o7777, 0o644);
    }

    #[tokio::test]
    async fn test_path_exists() {
        let dir = TempDir::new().unwrap();
        assert!(path_exists(dir.path()).await.unwrap());
        assert!(!path_exists(&dir.path().join("missing")).await.unwrap());
    }
}
