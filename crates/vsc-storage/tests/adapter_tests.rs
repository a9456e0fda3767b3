//! Adapter Command Tests
//!
//! Verifies the commands the GPFS and Lustre adapters issue, with a
//! recording command runner in place of the real `mm*`/`lfs` tools:
//! - byte limits reach the backend as KiB
//! - fileset existence checks interpret tool output
//! - dry-run issues no mutating command

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;
use vsc_storage::prelude::*;
use vsc_storage::{DryRunBackend, GpfsBackend, LustreBackend};

// =============================================================================
// Recording Command Runner
// =============================================================================

/// Records every invocation and replays queued outputs (success by default).
#[derive(Default)]
struct RecordingRunner {
    calls: Mutex<Vec<(String, Vec<String>)>>,
    replies: Mutex<VecDeque<CommandOutput>>,
}

impl RecordingRunner {
    fn with_replies(replies: Vec<CommandOutput>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(replies.into()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(program, args)| format!("{program} {}", args.join(" ")))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, program: &str, args: &[String]) -> StorageResult<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), args.to_vec()));
        Ok(self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| CommandOutput::ok("")))
    }
}

fn gpfs(runner: &Arc<RecordingRunner>) -> GpfsBackend {
    let definition = StorageDefinition::new("VSC_DATA", "kyukondata", BackendKind::Gpfs, "/data");
    GpfsBackend::new(Arc::new(definition), runner.clone())
}

fn lustre(runner: &Arc<RecordingRunner>, mount: &Path) -> LustreBackend {
    let mut definition =
        StorageDefinition::new("VSC_SCRATCH_KYUKON", "kyukon", BackendKind::Lustre, mount);
    definition.lustre_project_id_offset = 900_000;
    LustreBackend::new(Arc::new(definition), runner.clone())
}

// =============================================================================
// GPFS
// =============================================================================

#[tokio::test]
async fn test_gpfs_fileset_quota_is_converted_to_kib() {
    let runner = Arc::new(RecordingRunner::default());
    let backend = gpfs(&runner);

    backend
        .set_fileset_quota(19456, Path::new("/data/gent/gvo000/gvo00012"), "gvo00012", 20480)
        .await
        .unwrap();

    assert_eq!(
        runner.calls(),
        ["mmsetquota kyukondata:gvo00012 --block 19K:20K"]
    );
}

#[tokio::test]
async fn test_gpfs_user_quota_targets_parent_fileset() {
    let runner = Arc::new(RecordingRunner::default());
    let backend = gpfs(&runner);

    backend
        .set_user_quota(1025, 2_540_001, Path::new("/data/gent/gvo000/gvo00012"), 4096)
        .await
        .unwrap();

    assert_eq!(
        runner.calls(),
        ["mmsetquota kyukondata:gvo00012 --user 2540001 --block 2K:4K"]
    );
}

#[tokio::test]
async fn test_gpfs_fileset_exists_interprets_output() {
    let runner = Arc::new(RecordingRunner::with_replies(vec![
        CommandOutput::ok("Filesets in file system 'kyukondata':\ngvo00012 Linked /data/gent/gvo000/gvo00012"),
        CommandOutput::failed(2, "mmlsfileset: Fileset named gvo00013 does not exist."),
        CommandOutput::failed(1, "mmlsfileset: Permission denied"),
    ]));
    let backend = gpfs(&runner);

    assert!(backend.fileset_exists("kyukondata", "gvo00012").await.unwrap());
    assert!(!backend.fileset_exists("kyukondata", "gvo00013").await.unwrap());
    assert!(backend.fileset_exists("kyukondata", "gvo00014").await.is_err());
}

#[tokio::test]
async fn test_gpfs_rejects_foreign_filesystem() {
    let runner = Arc::new(RecordingRunner::default());
    let backend = gpfs(&runner);

    let err = backend.fileset_exists("scratch", "gvo00012").await.unwrap_err();
    assert!(matches!(err, StorageError::FilesystemMismatch { .. }));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_gpfs_create_fileset_creates_and_links() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let backend = gpfs(&runner);
    let path = dir.path().join("gent/gvo000/gvo00012");

    backend.create_fileset(&path, "gvo00012").await.unwrap();

    assert!(dir.path().join("gent/gvo000").is_dir());
    assert_eq!(
        runner.calls(),
        [
            "mmcrfileset kyukondata gvo00012 --inode-space new".to_string(),
            format!("mmlinkfileset kyukondata gvo00012 -J {}", path.display()),
        ]
    );
}

#[tokio::test]
async fn test_gpfs_command_failure_surfaces() {
    let runner = Arc::new(RecordingRunner::with_replies(vec![CommandOutput::failed(
        1,
        "Disk quota exceeded",
    )]));
    let backend = gpfs(&runner);

    let err = backend
        .set_fileset_grace(Path::new("/data"), Duration::from_secs(604_800))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::CommandFailed { status: 1, .. }));
    assert_eq!(
        runner.calls(),
        ["mmsetquota kyukondata --grace fileset --block 604800seconds"]
    );
}

// =============================================================================
// Lustre
// =============================================================================

#[tokio::test]
async fn test_lustre_project_id_uses_suffix_and_offset() {
    let runner = Arc::new(RecordingRunner::default());
    let backend = lustre(&runner, Path::new("/scratch"));

    assert_eq!(backend.project_id("gvo00012").unwrap(), 900_012);
    assert!(backend.project_id("gvoxx").is_err());
}

#[tokio::test]
async fn test_lustre_project_quota() {
    let runner = Arc::new(RecordingRunner::default());
    let backend = lustre(&runner, Path::new("/scratch"));

    backend
        .set_fileset_quota(19456, Path::new("/scratch/gent/gvo000/gvo00012"), "gvo00012", 20480)
        .await
        .unwrap();

    assert_eq!(
        runner.calls(),
        ["lfs setquota -p 900012 -b 19k -B 20k /scratch"]
    );
}

#[tokio::test]
async fn test_lustre_fileset_exists_uses_project_search() {
    let runner = Arc::new(RecordingRunner::with_replies(vec![
        CommandOutput::ok("/scratch/gent/gvo000/gvo00012\n"),
        CommandOutput::ok(""),
    ]));
    let backend = lustre(&runner, Path::new("/scratch"));

    assert!(backend.fileset_exists("kyukon", "gvo00012").await.unwrap());
    assert!(!backend.fileset_exists("kyukon", "gvo00013").await.unwrap());
    assert_eq!(
        runner.calls()[0],
        "lfs find /scratch --maxdepth 4 --type d --projid 900012"
    );
}

#[tokio::test]
async fn test_lustre_create_fileset_tags_directory() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let backend = lustre(&runner, dir.path());
    let path = dir.path().join("gent/gvo000/gvo00012");

    backend.create_fileset(&path, "gvo00012").await.unwrap();

    assert!(path.is_dir());
    assert_eq!(
        runner.calls(),
        [format!("lfs project -p 900012 -s -r {}", path.display())]
    );
}

#[tokio::test]
async fn test_lustre_user_quota_is_a_noop() {
    let runner = Arc::new(RecordingRunner::default());
    let backend = lustre(&runner, Path::new("/scratch"));

    backend
        .set_user_quota(1024, 2_540_001, Path::new("/scratch/gent/gvo000/gvo00012"), 2048)
        .await
        .unwrap();
    assert!(runner.calls().is_empty());
}

// =============================================================================
// Dry run
// =============================================================================

#[tokio::test]
async fn test_dry_run_issues_no_mutating_command() {
    let dir = TempDir::new().unwrap();
    let runner = Arc::new(RecordingRunner::default());
    let backend = DryRunBackend::new(Arc::new(gpfs(&runner)));
    let path = dir.path().join("gvo00012");

    assert!(backend.fileset_exists("kyukondata", "gvo00012").await.unwrap());
    backend.create_fileset(&path, "gvo00012").await.unwrap();
    backend.set_owner(0, 0, &path).await.unwrap();
    backend.set_mode(0o770, &path).await.unwrap();
    backend
        .set_fileset_quota(19456, &path, "gvo00012", 20480)
        .await
        .unwrap();
    backend
        .set_fileset_grace(&path, Duration::from_secs(60))
        .await
        .unwrap();
    backend.set_user_quota(1, 0, &path, 2).await.unwrap();
    assert!(backend
        .create_owned_directory(&path, 0o700, 0, 0, true)
        .await
        .unwrap());
    assert!(backend
        .create_owned_file(&path.join(".bashrc"), b"", 0o644, 0, 0)
        .await
        .unwrap());

    // only the read reached the runner, nothing touched the disk
    assert_eq!(runner.calls(), ["mmlsfileset kyukondata gvo00012"]);
    assert!(!path.exists());
    assert_eq!(backend.kind(), BackendKind::Gpfs);
}
