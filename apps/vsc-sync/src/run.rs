//! The two things the binary does: run a pass, or report the last one.

use std::sync::Arc;
use tracing::{error, info};

use vsc_accountpage::AccountPageClient;
use vsc_core::EntityKind;
use vsc_provisioning::{
    resolve_nobody_uid, FileRunLock, FileWatermarkStore, HealthReport, HealthStatus,
    ReconciliationEngine, RunCoordinator, SyncContext,
};
use vsc_storage::{CommandRunner, StorageRegistry, SystemCommandRunner};

use crate::config::SyncConfig;
use crate::error::CliResult;

/// Header of the Nagios status line.
pub const NAGIOS_HEADER: &str = "vsc-sync";

/// Build the engine and the per-run context from the configuration.
pub fn build(config: &SyncConfig, dry_run: bool) -> CliResult<(ReconciliationEngine, SyncContext)> {
    let token = config.accountpage.resolve_token()?;
    let client = AccountPageClient::new(
        &config.accountpage.base_url,
        token,
        config.accountpage.timeout(),
    )?;

    let runner: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
    let storages = StorageRegistry::from_definitions(config.storage_definitions(), runner, dry_run)?;

    let ctx = SyncContext::new(
        Arc::new(client),
        storages,
        config.quota.policy()?,
        config.quota.member_share()?,
    )
    .with_dry_run(dry_run)
    .with_nobody_uid(resolve_nobody_uid());

    let watermarks = Arc::new(FileWatermarkStore::new(&config.paths.watermark_file));
    let engine = ReconciliationEngine::new(config.engine_config(), watermarks);
    Ok((engine, ctx))
}

/// Run one pass under the run lock and return its health.
///
/// Setup failures still produce a CRITICAL report in the health cache so the
/// monitoring poller sees them.
pub async fn synchronise(config: &SyncConfig, kinds: &[EntityKind], dry_run: bool) -> HealthReport {
    let cache = config.paths.health_cache();

    let (engine, ctx) = match build(config, dry_run) {
        Ok(built) => built,
        Err(e) => {
            error!(error = %e, "Cannot set up synchronisation");
            let report = HealthReport::critical(format!("setup failed: {e}"));
            if let Err(e) = cache.write(&report).await {
                error!(path = %cache.path().display(), error = %e, "Cannot write health cache");
            }
            return report;
        }
    };

    info!(
        run_id = %ctx.run_id(),
        dry_run,
        kinds = ?kinds,
        storages = ctx.storages().len(),
        "Starting synchronisation"
    );

    let lock = FileRunLock::new(&config.paths.lock_file);
    let mut coordinator = RunCoordinator::new(Box::new(lock), cache, config.thresholds);
    coordinator.run(&engine, &ctx, kinds).await
}

/// Read the cached report of the last pass.
pub async fn nagios(config: &SyncConfig) -> CliResult<HealthReport> {
    Ok(config.paths.health_cache().read().await?)
}

/// Process exit code for a report.
///
/// `--nagios` uses the plugin convention; a synchronisation run only fails
/// when the pass was CRITICAL.
pub fn exit_code(report: &HealthReport, nagios: bool) -> i32 {
    if nagios {
        return report.status.exit_code();
    }
    match report.status {
        HealthStatus::Critical => HealthStatus::Critical.exit_code(),
        _ => 0,
    }
}
