//! Run coordinator tests: locking, health status and the health cache.

mod common;

use std::sync::Arc;

use common::*;
use tempfile::TempDir;
use vsc_core::{EntityKind, EntityStatus};
use vsc_provisioning::{
    FileRunLock, HealthCache, HealthStatus, RunCoordinator, RunLock, Threshold, Thresholds,
};

struct Fixture {
    _dir: TempDir,
    lock_path: std::path::PathBuf,
    cache: HealthCache,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let lock_path = dir.path().join("run/vsc-sync.lock");
    let cache = HealthCache::new(dir.path().join("cache/health.json"));
    Fixture {
        _dir: dir,
        lock_path,
        cache,
    }
}

fn coordinator(fixture: &Fixture, thresholds: Thresholds) -> RunCoordinator {
    RunCoordinator::new(
        Box::new(FileRunLock::new(&fixture.lock_path)),
        fixture.cache.clone(),
        thresholds,
    )
}

#[tokio::test]
async fn test_successful_run_is_ok_and_cached() {
    let fixture = fixture();
    let source = Arc::new(
        MockSource::new().with_changed_account(account("vsc40001", 2_540_001, EntityStatus::New)),
    );
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryWatermarkStore::new(None));
    let ctx = context(&source, registry(&backend, false), false);

    let report = coordinator(&fixture, Thresholds::default())
        .run(&engine(&store), &ctx, &[EntityKind::User])
        .await;

    assert_eq!(report.status, HealthStatus::Ok);
    assert_eq!(report.run_id, Some(ctx.run_id()));
    let line = report.nagios_line("vsc-sync");
    assert!(line.starts_with("OK vsc-sync "), "{line}");
    assert!(line.contains("VSC_HOME_users_sync=1"), "{line}");
    assert!(line.contains("VSC_HOME_users_sync_fail=0;1;10"), "{line}");

    assert!(!fixture.lock_path.exists(), "lock is released");
    assert_eq!(fixture.cache.read().await.unwrap(), report);
}

#[tokio::test]
async fn test_held_lock_is_critical_and_touches_nothing() {
    let fixture = fixture();
    let mut holder = FileRunLock::new(&fixture.lock_path);
    holder.try_acquire().unwrap();

    let source = Arc::new(
        MockSource::new().with_changed_account(account("vsc40001", 2_540_001, EntityStatus::New)),
    );
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryWatermarkStore::new(None));
    let ctx = context(&source, registry(&backend, false), false);

    let report = coordinator(&fixture, Thresholds::default())
        .run(&engine(&store), &ctx, &[EntityKind::User])
        .await;

    assert_eq!(report.status, HealthStatus::Critical);
    assert_eq!(report.status.exit_code(), 2);
    assert!(report.message.contains("another run holds"), "{}", report.message);
    assert_eq!(source.fetch_changed_calls(), 0);
    assert!(backend.calls().is_empty());
    assert_eq!(store.store_calls(), 0);
    assert_eq!(fixture.cache.read().await.unwrap().status, HealthStatus::Critical);

    holder.release().unwrap();
}

#[tokio::test]
async fn test_entity_failures_raise_warning_then_critical() {
    let source = Arc::new(
        MockSource::new()
            .with_changed_account(account("vsc40001", 2_540_001, EntityStatus::New))
            .with_changed_account(account("vsc40002", 2_540_002, EntityStatus::New))
            .with_failing_account("vsc40002"),
    );

    let relaxed = fixture();
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryWatermarkStore::new(None));
    let ctx = context(&source, registry(&backend, false), false);
    let report = coordinator(&relaxed, Thresholds::default())
        .run(&engine(&store), &ctx, &[EntityKind::User])
        .await;
    assert_eq!(report.status, HealthStatus::Warning);
    assert!(report.message.contains("VSC_HOME_users_sync_fail=1"), "{}", report.message);
    assert!(store.current().is_some(), "watermark still advances");

    let strict = Thresholds {
        users: Threshold::new(1, 1),
        ..Thresholds::default()
    };
    let strict_fixture = fixture();
    let ctx = context(&source, registry(&backend, false), false);
    let report = coordinator(&strict_fixture, strict)
        .run(&engine(&store), &ctx, &[EntityKind::User])
        .await;
    assert_eq!(report.status, HealthStatus::Critical);
}

#[tokio::test]
async fn test_fatal_pass_is_critical() {
    let fixture = fixture();
    let source = Arc::new(MockSource::new().with_failing_changes());
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryWatermarkStore::new(None));
    let ctx = context(&source, registry(&backend, false), false);

    let report = coordinator(&fixture, Thresholds::default())
        .run(&engine(&store), &ctx, &[EntityKind::User])
        .await;

    assert_eq!(report.status, HealthStatus::Critical);
    assert!(report.message.contains("pass aborted during fetch_changes"), "{}", report.message);
    assert!(!fixture.lock_path.exists(), "lock is released after a fatal pass");
}

#[tokio::test]
async fn test_watermark_write_failure_is_warning() {
    let fixture = fixture();
    let source = Arc::new(
        MockSource::new().with_changed_account(account("vsc40001", 2_540_001, EntityStatus::New)),
    );
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryWatermarkStore::new(None).with_failing_store());
    let ctx = context(&source, registry(&backend, false), false);

    let report = coordinator(&fixture, Thresholds::default())
        .run(&engine(&store), &ctx, &[EntityKind::User])
        .await;

    assert_eq!(report.status, HealthStatus::Warning);
    assert!(
        report.message.contains("the next run reprocesses the same changes"),
        "{}",
        report.message
    );
}

#[tokio::test]
async fn test_project_metrics_are_reported() {
    let fixture = fixture();
    let source = Arc::new(
        MockSource::new()
            .with_account(account("vsc40001", 2_540_001, EntityStatus::Active))
            .with_changed_group(group("proj_test01", 2_900_001, &["vsc40001"]))
            .with_group_quota(quota("proj_test01", SCRATCH, 10))
            .with_changed_group(group("proj_test02", 2_900_002, &["vsc40001"]))
            .with_failing_group("proj_test02"),
    );
    let backend = Arc::new(RecordingBackend::new());
    let store = Arc::new(MemoryWatermarkStore::new(None));
    let ctx = context(&source, registry(&backend, false), false);

    let report = coordinator(&fixture, Thresholds::default())
        .run(&engine(&store), &ctx, &[EntityKind::Project])
        .await;

    assert_eq!(report.status, HealthStatus::Warning);
    let line = report.nagios_line("vsc-sync");
    assert!(line.contains("VSC_SCRATCH_KYUKON_prj_sync=1"), "{line}");
    assert!(line.contains("VSC_SCRATCH_KYUKON_prj_sync_fail=1;1;2"), "{line}");
}
