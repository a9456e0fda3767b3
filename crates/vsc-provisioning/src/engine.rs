//! Reconciliation engine.
//!
//! One call to [`ReconciliationEngine::run_pass`] walks
//! `INIT -> LOAD_WATERMARK -> FETCH_CHANGES -> PROCESS -> DECIDE_WATERMARK -> REPORT -> DONE`.
//! Errors before `PROCESS` end the pass in `FATAL`; from `PROCESS` on, every
//! failure is scoped to one entity and only shows up in the summary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;
use vsc_accountpage::ChangeFilter;
use vsc_core::{EntityKind, QuotaRecord, VscId, Watermark};

use crate::context::SyncContext;
use crate::error::{EngineError, EngineResult};
use crate::provisioner::{
    apply_user_quota, provision, EntityOutcome, ProjectProvisioner, ProjectSettings,
    UserProvisioner, UserSettings,
};
use crate::result_set::ResultSet;
use crate::watermark::WatermarkStore;

/// Phases of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassPhase {
    Init,
    LoadWatermark,
    FetchChanges,
    Process,
    DecideWatermark,
    Report,
    Done,
    Fatal,
}

impl PassPhase {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PassPhase::Init => "init",
            PassPhase::LoadWatermark => "load_watermark",
            PassPhase::FetchChanges => "fetch_changes",
            PassPhase::Process => "process",
            PassPhase::DecideWatermark => "decide_watermark",
            PassPhase::Report => "report",
            PassPhase::Done => "done",
            PassPhase::Fatal => "fatal",
        }
    }
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which entity kinds the engine knows how to provision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub users: Option<UserSettings>,
    #[serde(default)]
    pub projects: Option<ProjectSettings>,
}

/// Outcome of the user part of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPassResult {
    /// Home storage; the user metrics are reported under its name.
    pub storage: String,
    pub ok: Vec<VscId>,
    pub failed: Vec<VscId>,
    /// Quota-change results, one per quota storage.
    pub quota: Vec<QuotaPassResult>,
}

/// Outcome of applying changed quota records on one storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPassResult {
    pub storage: String,
    pub ok: Vec<VscId>,
    pub failed: Vec<VscId>,
}

/// Outcome of the project part of a pass.
///
/// A project with failed members appears in both sets: under `ok` with the
/// members that succeeded and under `failed` with those that did not. A
/// project that failed as a whole appears only in `failed`, without members.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectPassResult {
    pub storage: String,
    pub ok: ResultSet,
    pub failed: ResultSet,
}

/// Everything a pass did, as reported to the coordinator.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub run_id: Uuid,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// `Done` or `Fatal` once the pass returns.
    pub phase: PassPhase,
    /// Phase the fatal error happened in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_phase: Option<PassPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
    /// Watermark the change set was selected with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Watermark>,
    /// Watermark the pass would advance to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Watermark>,
    /// Watermark actually stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<Watermark>,
    /// Why storing the candidate failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watermark_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub users: Option<UserPassResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<ProjectPassResult>,
}

impl PassSummary {
    fn new(run_id: Uuid, dry_run: bool) -> Self {
        Self {
            run_id,
            dry_run,
            started_at: Utc::now(),
            completed_at: None,
            phase: PassPhase::Init,
            failed_phase: None,
            fatal_error: None,
            previous: None,
            candidate: None,
            committed: None,
            watermark_error: None,
            users: None,
            projects: None,
        }
    }

    fn enter(&mut self, phase: PassPhase) {
        debug!(from = %self.phase, to = %phase, "Pass phase");
        self.phase = phase;
    }

    fn fail(mut self, error: &EngineError) -> Self {
        error!(phase = %error.phase(), error = %error, "Pass aborted");
        self.failed_phase = Some(error.phase());
        self.fatal_error = Some(error.to_string());
        self.phase = PassPhase::Fatal;
        self.completed_at = Some(Utc::now());
        self
    }

    /// Whether the pass ended in `FATAL`.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.phase == PassPhase::Fatal
    }

    /// Total number of failed users, quota records and projects.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        let users = self.users.as_ref().map_or(0, |u| {
            u.failed.len() + u.quota.iter().map(|q| q.failed.len()).sum::<usize>()
        });
        let projects = self.projects.as_ref().map_or(0, |p| p.failed.len());
        users + projects
    }
}

/// Everything read from the account page before processing starts.
#[derive(Debug, Default)]
struct ChangeSet {
    accounts: Option<Vec<VscId>>,
    user_quota: Vec<(String, Vec<QuotaRecord>)>,
    projects: Option<Vec<VscId>>,
}

/// Drives synchronisation passes.
pub struct ReconciliationEngine {
    config: EngineConfig,
    watermarks: Arc<dyn WatermarkStore>,
}

impl ReconciliationEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: EngineConfig, watermarks: Arc<dyn WatermarkStore>) -> Self {
        Self { config, watermarks }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run one pass over `kinds`. Never fails: fatal errors end up in the summary.
    pub async fn run_pass(&self, ctx: &SyncContext, kinds: &[EntityKind]) -> PassSummary {
        let span = ctx.span().clone();
        self.execute(ctx, kinds).instrument(span).await
    }

    async fn execute(&self, ctx: &SyncContext, kinds: &[EntityKind]) -> PassSummary {
        let mut summary = PassSummary::new(ctx.run_id(), ctx.dry_run());
        info!(kinds = ?kinds, "Starting synchronisation pass");

        if let Err(e) = self.check_kinds(ctx, kinds) {
            return summary.fail(&e);
        }

        summary.enter(PassPhase::LoadWatermark);
        let previous = self.load_watermark().await;
        summary.previous = Some(previous);

        summary.enter(PassPhase::FetchChanges);
        let now = match ctx.source().server_time().await {
            Ok(now) => Watermark::new(now),
            Err(e) => return summary.fail(&EngineError::ServerTime(e)),
        };
        let changes = match self.fetch_changes(ctx, kinds, &previous).await {
            Ok(changes) => changes,
            Err(e) => return summary.fail(&e),
        };

        summary.enter(PassPhase::Process);
        if let (Some(settings), Some(accounts)) = (&self.config.users, changes.accounts) {
            summary.users = Some(
                self.process_users(ctx, settings, accounts, changes.user_quota)
                    .await,
            );
        }
        if let (Some(settings), Some(projects)) = (&self.config.projects, changes.projects) {
            summary.projects = Some(
                self.process_projects(ctx, settings, projects, previous)
                    .await,
            );
        }

        summary.enter(PassPhase::DecideWatermark);
        let candidate = previous.advance_to(now);
        summary.candidate = Some(candidate);
        if ctx.dry_run() {
            info!(candidate = %candidate, "(dryrun) Not storing watermark");
        } else {
            match self.watermarks.store(&candidate).await {
                Ok(()) => {
                    info!(watermark = %candidate, "Watermark advanced");
                    summary.committed = Some(candidate);
                }
                Err(e) => {
                    error!(
                        candidate = %candidate,
                        error = %e,
                        "Cannot store watermark, the next run reprocesses this change set"
                    );
                    summary.watermark_error = Some(e.to_string());
                }
            }
        }

        summary.enter(PassPhase::Report);
        info!(
            failures = summary.failure_count(),
            committed = summary.committed.is_some(),
            "Synchronisation pass finished"
        );
        summary.enter(PassPhase::Done);
        summary.completed_at = Some(Utc::now());
        summary
    }

    fn check_kinds(&self, ctx: &SyncContext, kinds: &[EntityKind]) -> EngineResult<()> {
        if kinds.is_empty() {
            return Err(EngineError::configuration("no entity kind selected"));
        }
        for kind in kinds {
            let storages: Vec<&str> = match kind {
                EntityKind::User => self
                    .config
                    .users
                    .as_ref()
                    .ok_or_else(|| EngineError::configuration("users are not configured"))?
                    .referenced_storages()
                    .collect(),
                EntityKind::Project => vec![self
                    .config
                    .projects
                    .as_ref()
                    .ok_or_else(|| EngineError::configuration("projects are not configured"))?
                    .storage
                    .as_str()],
            };
            if let Some(missing) = storages.iter().find(|s| !ctx.storages().contains(s)) {
                return Err(EngineError::configuration(format!(
                    "{kind} storage '{missing}' is not defined"
                )));
            }
        }
        Ok(())
    }

    /// The stored watermark, or the far-past default if it cannot be read.
    async fn load_watermark(&self) -> Watermark {
        match self.watermarks.load().await {
            Ok(Some(watermark)) => {
                info!(watermark = %watermark, "Loaded watermark");
                watermark
            }
            Ok(None) => {
                warn!(default = %Watermark::far_past(), "No watermark stored, starting from the far past");
                Watermark::far_past()
            }
            Err(e) => {
                error!(error = %e, default = %Watermark::far_past(), "Cannot read watermark, starting from the far past");
                Watermark::far_past()
            }
        }
    }

    async fn fetch_changes(
        &self,
        ctx: &SyncContext,
        kinds: &[EntityKind],
        since: &Watermark,
    ) -> EngineResult<ChangeSet> {
        let mut changes = ChangeSet::default();

        if kinds.contains(&EntityKind::User) {
            if let Some(settings) = &self.config.users {
                let mut filter = ChangeFilter::any();
                if let Some(institute) = &settings.institute {
                    filter = filter.with_institute(institute.clone());
                }
                let changed = ctx
                    .source()
                    .fetch_changed(EntityKind::User, since, &filter)
                    .await
                    .map_err(|source| EngineError::FetchChanges {
                        kind: EntityKind::User,
                        source,
                    })?;
                let accounts = sorted_ids(changed.iter().map(|e| e.entity_id().clone()));

                for storage in settings.quota_storages() {
                    let records = ctx
                        .source()
                        .fetch_quota_changes(EntityKind::User, storage, since)
                        .await
                        .map_err(|source| EngineError::FetchQuota {
                            kind: EntityKind::User,
                            storage: storage.to_string(),
                            source,
                        })?;
                    changes.user_quota.push((storage.to_string(), records));
                }
                info!(accounts = accounts.len(), since = %since, "Fetched changed accounts");
                changes.accounts = Some(accounts);
            }
        }

        if kinds.contains(&EntityKind::Project) {
            if let Some(settings) = &self.config.projects {
                let mut filter = ChangeFilter::any().with_prefix(settings.prefix.clone());
                if let Some(institute) = &settings.institute {
                    filter = filter.with_institute(institute.clone());
                }
                let changed = ctx
                    .source()
                    .fetch_changed(EntityKind::Project, since, &filter)
                    .await
                    .map_err(|source| EngineError::FetchChanges {
                        kind: EntityKind::Project,
                        source,
                    })?;
                let quota = ctx
                    .source()
                    .fetch_quota_changes(EntityKind::Project, &settings.storage, since)
                    .await
                    .map_err(|source| EngineError::FetchQuota {
                        kind: EntityKind::Project,
                        storage: settings.storage.clone(),
                        source,
                    })?;

                let projects = sorted_ids(
                    changed
                        .iter()
                        .map(|e| e.entity_id().clone())
                        .chain(
                            quota
                                .into_iter()
                                .filter(|record| record.fileset.starts_with(&settings.prefix))
                                .map(|record| record.owner),
                        )
                        .filter(|id| settings.selects(id)),
                );
                info!(projects = projects.len(), since = %since, "Fetched changed projects");
                changes.projects = Some(projects);
            }
        }

        Ok(changes)
    }

    async fn process_users(
        &self,
        ctx: &SyncContext,
        settings: &UserSettings,
        accounts: Vec<VscId>,
        quota: Vec<(String, Vec<QuotaRecord>)>,
    ) -> UserPassResult {
        let mut result = UserPassResult {
            storage: settings.home_storage.clone(),
            ..UserPassResult::default()
        };

        for id in accounts {
            let outcome = match UserProvisioner::load(ctx, settings, &id).await {
                Ok(provisioner) => provision(ctx, provisioner).await,
                Err(e) => EntityOutcome::failed(id, EntityKind::User, e),
            };
            outcome.log_failure(&settings.home_storage);
            match outcome {
                EntityOutcome::Provisioned { id, report } => {
                    debug!(entity_id = %id, created_home = report.created_home, "User provisioned");
                    result.ok.push(id);
                }
                EntityOutcome::Failed { id, .. } => result.failed.push(id),
            }
        }

        for (storage, records) in quota {
            let mut storage_result = QuotaPassResult {
                storage: storage.clone(),
                ..QuotaPassResult::default()
            };
            for record in records {
                match apply_user_quota(ctx, &record).await {
                    Ok(()) => storage_result.ok.push(record.owner),
                    Err(e) => {
                        error!(
                            entity_id = %record.owner,
                            kind = %EntityKind::User,
                            storage = %storage,
                            error = %e,
                            "Quota update failed"
                        );
                        storage_result.failed.push(record.owner);
                    }
                }
            }
            result.quota.push(storage_result);
        }

        info!(
            storage = %result.storage,
            ok = result.ok.len(),
            failed = result.failed.len(),
            "Processed users"
        );
        result
    }

    async fn process_projects(
        &self,
        ctx: &SyncContext,
        settings: &ProjectSettings,
        projects: Vec<VscId>,
        since: Watermark,
    ) -> ProjectPassResult {
        let mut result = ProjectPassResult {
            storage: settings.storage.clone(),
            ..ProjectPassResult::default()
        };

        for id in projects {
            let outcome = match ProjectProvisioner::load(ctx, settings, &id, since).await {
                Ok(provisioner) => provision(ctx, provisioner).await,
                Err(e) => EntityOutcome::failed(id, EntityKind::Project, e),
            };
            outcome.log_failure(&settings.storage);
            match outcome {
                EntityOutcome::Provisioned { id, report } => {
                    if !report.failed.is_empty() {
                        result.failed.record(id.clone(), report.failed);
                    }
                    result.ok.record(id, report.ok);
                }
                EntityOutcome::Failed { id, .. } => result.failed.touch(id),
            }
        }

        info!(
            storage = %result.storage,
            ok = result.ok.len(),
            failed = result.failed.len(),
            "Processed projects"
        );
        result
    }
}

fn sorted_ids(ids: impl IntoIterator<Item = VscId>) -> Vec<VscId> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_ids_dedupes() {
        let ids = ["vsc40003", "vsc40001", "vsc40003", "vsc40002"]
            .iter()
            .map(|s| VscId::new(*s).unwrap());
        let sorted = sorted_ids(ids);
        let names: Vec<&str> = sorted.iter().map(VscId::as_str).collect();
        assert_eq!(names, vec!["vsc40001", "vsc40002", "vsc40003"]);
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(PassPhase::FetchChanges.to_string(), "fetch_changes");
        assert_eq!(
            serde_json::to_string(&PassPhase::DecideWatermark).unwrap(),
            "\"decide_watermark\""
        );
    }

    #[test]
    fn test_failure_count() {
        let mut summary = PassSummary::new(Uuid::new_v4(), false);
        assert_eq!(summary.failure_count(), 0);

        let id = |s: &str| VscId::new(s).unwrap();
        summary.users = Some(UserPassResult {
            storage: "VSC_HOME".to_string(),
            ok: vec![id("vsc40001")],
            failed: vec![id("vsc40002")],
            quota: vec![QuotaPassResult {
                storage: "VSC_HOME".to_string(),
                ok: Vec::new(),
                failed: vec![id("vsc40003")],
            }],
        });
        let mut failed = ResultSet::new();
        failed.touch(id("proj_a01"));
        summary.projects = Some(ProjectPassResult {
            storage: "VSC_SCRATCH".to_string(),
            ok: ResultSet::new(),
            failed,
        });
        assert_eq!(summary.failure_count(), 3);
    }
}
