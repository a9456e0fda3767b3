//! Shared mocks for the provisioning integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vsc_accountpage::{ChangeFilter, EntitySource, SourceError, SourceResult};
use vsc_core::{
    Account, Entity, EntityKind, EntityStatus, Fraction, Group, QuotaPolicy, QuotaRecord, VscId,
    Watermark,
};
use vsc_provisioning::{
    EngineConfig, ProjectSettings, ReconciliationEngine, SyncContext, UserSettings,
    WatermarkError, WatermarkStore,
};
use vsc_storage::{
    BackendKind, DryRunBackend, PathTemplate, StorageBackend, StorageDefinition, StorageError,
    StorageHandle, StorageRegistry, StorageResult,
};

pub const NOBODY: u32 = 65534;

pub fn id(raw: &str) -> VscId {
    VscId::new(raw).unwrap()
}

pub fn server_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 6, 1, 12, 30, 5).unwrap()
}

pub fn account(raw: &str, uid: u32, status: EntityStatus) -> Account {
    Account {
        vsc_id: id(raw),
        uid,
        gid: uid,
        status,
        institute: "gent".to_string(),
    }
}

pub fn group(raw: &str, gid: u32, moderators: &[&str]) -> Group {
    Group {
        vsc_id: id(raw),
        gid,
        status: EntityStatus::Active,
        institute: "gent".to_string(),
        moderators: moderators.iter().map(|m| id(m)).collect(),
        members: Vec::new(),
    }
}

pub fn quota(owner: &str, storage: &str, hard_kib: u64) -> QuotaRecord {
    QuotaRecord {
        owner: id(owner),
        storage: storage.to_string(),
        fileset: owner.to_string(),
        hard_kib,
    }
}

fn api_error(detail: &str) -> SourceError {
    SourceError::ApiError {
        status: 502,
        detail: detail.to_string(),
    }
}

// =============================================================================
// Mock account page
// =============================================================================

#[derive(Default)]
struct SourceState {
    accounts: BTreeMap<VscId, Account>,
    groups: BTreeMap<VscId, Group>,
    account_quota: BTreeMap<VscId, Vec<QuotaRecord>>,
    group_quota: BTreeMap<VscId, Vec<QuotaRecord>>,
    changed_users: Vec<VscId>,
    changed_projects: Vec<VscId>,
    user_quota_changes: Vec<QuotaRecord>,
    project_quota_changes: Vec<QuotaRecord>,
    members: BTreeMap<VscId, Vec<VscId>>,
    pubkeys: BTreeMap<VscId, Vec<String>>,
    failing_accounts: HashSet<VscId>,
    failing_groups: HashSet<VscId>,
}

/// In-memory account page with failure injection.
pub struct MockSource {
    state: Mutex<SourceState>,
    now: Mutex<DateTime<Utc>>,
    fail_changes: AtomicBool,
    fail_server_time: AtomicBool,
    pushes: Mutex<Vec<(VscId, EntityStatus)>>,
    since_seen: Mutex<Vec<Watermark>>,
    fetch_changed_calls: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SourceState::default()),
            now: Mutex::new(server_now()),
            fail_changes: AtomicBool::new(false),
            fail_server_time: AtomicBool::new(false),
            pushes: Mutex::new(Vec::new()),
            since_seen: Mutex::new(Vec::new()),
            fetch_changed_calls: AtomicUsize::new(0),
        }
    }

    /// Add an account to the changed set.
    pub fn with_changed_account(self, account: Account) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.changed_users.push(account.vsc_id.clone());
            state.accounts.insert(account.vsc_id.clone(), account);
        }
        self
    }

    /// Add an account that is not part of the changed set.
    pub fn with_account(self, account: Account) -> Self {
        self.state
            .lock()
            .unwrap()
            .accounts
            .insert(account.vsc_id.clone(), account);
        self
    }

    pub fn with_account_quota(self, record: QuotaRecord) -> Self {
        self.state
            .lock()
            .unwrap()
            .account_quota
            .entry(record.owner.clone())
            .or_default()
            .push(record);
        self
    }

    pub fn with_pubkey(self, owner: &str, key: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .pubkeys
            .entry(id(owner))
            .or_default()
            .push(key.to_string());
        self
    }

    /// Add a group to the changed set.
    pub fn with_changed_group(self, group: Group) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.changed_projects.push(group.vsc_id.clone());
            state.groups.insert(group.vsc_id.clone(), group);
        }
        self
    }

    /// Add a group that is not part of the changed set.
    pub fn with_group(self, group: Group) -> Self {
        self.state
            .lock()
            .unwrap()
            .groups
            .insert(group.vsc_id.clone(), group);
        self
    }

    pub fn with_group_quota(self, record: QuotaRecord) -> Self {
        self.state
            .lock()
            .unwrap()
            .group_quota
            .entry(record.owner.clone())
            .or_default()
            .push(record);
        self
    }

    pub fn with_user_quota_change(self, record: QuotaRecord) -> Self {
        self.state.lock().unwrap().user_quota_changes.push(record);
        self
    }

    pub fn with_project_quota_change(self, record: QuotaRecord) -> Self {
        self.state.lock().unwrap().project_quota_changes.push(record);
        self
    }

    pub fn with_modified_members(self, project: &str, members: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .members
            .insert(id(project), members.iter().map(|m| id(m)).collect());
        self
    }

    pub fn with_failing_account(self, raw: &str) -> Self {
        self.state.lock().unwrap().failing_accounts.insert(id(raw));
        self
    }

    pub fn with_failing_group(self, raw: &str) -> Self {
        self.state.lock().unwrap().failing_groups.insert(id(raw));
        self
    }

    pub fn with_failing_changes(self) -> Self {
        self.fail_changes.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_server_time(self) -> Self {
        self.fail_server_time.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn pushes(&self) -> Vec<(VscId, EntityStatus)> {
        self.pushes.lock().unwrap().clone()
    }

    pub fn since_seen(&self) -> Vec<Watermark> {
        self.since_seen.lock().unwrap().clone()
    }

    pub fn fetch_changed_calls(&self) -> usize {
        self.fetch_changed_calls.load(Ordering::SeqCst)
    }

    pub fn status_of(&self, raw: &str) -> Option<EntityStatus> {
        self.state
            .lock()
            .unwrap()
            .accounts
            .get(&id(raw))
            .map(|a| a.status)
    }
}

#[async_trait]
impl EntitySource for MockSource {
    async fn server_time(&self) -> SourceResult<DateTime<Utc>> {
        if self.fail_server_time.load(Ordering::SeqCst) {
            return Err(SourceError::ServerTime("no Date header".to_string()));
        }
        Ok(*self.now.lock().unwrap())
    }

    async fn fetch_changed(
        &self,
        kind: EntityKind,
        since: &Watermark,
        filter: &ChangeFilter,
    ) -> SourceResult<Vec<Entity>> {
        self.fetch_changed_calls.fetch_add(1, Ordering::SeqCst);
        self.since_seen.lock().unwrap().push(*since);
        if self.fail_changes.load(Ordering::SeqCst) {
            return Err(api_error("account page unavailable"));
        }
        let state = self.state.lock().unwrap();
        let entities = match kind {
            EntityKind::User => state
                .changed_users
                .iter()
                .filter_map(|id| state.accounts.get(id).cloned().map(Entity::User))
                .collect::<Vec<_>>(),
            EntityKind::Project => state
                .changed_projects
                .iter()
                .filter_map(|id| state.groups.get(id).cloned().map(Entity::Project))
                .collect(),
        };
        Ok(entities.into_iter().filter(|e| filter.matches(e)).collect())
    }

    async fn fetch_account(&self, id: &VscId) -> SourceResult<Account> {
        let state = self.state.lock().unwrap();
        if state.failing_accounts.contains(id) {
            return Err(api_error("account lookup failed"));
        }
        state
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn fetch_group(&self, id: &VscId) -> SourceResult<Group> {
        let state = self.state.lock().unwrap();
        if state.failing_groups.contains(id) {
            return Err(api_error("group lookup failed"));
        }
        state
            .groups
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(id.to_string()))
    }

    async fn fetch_quota_changes(
        &self,
        kind: EntityKind,
        storage: &str,
        _since: &Watermark,
    ) -> SourceResult<Vec<QuotaRecord>> {
        let state = self.state.lock().unwrap();
        let records = match kind {
            EntityKind::User => &state.user_quota_changes,
            EntityKind::Project => &state.project_quota_changes,
        };
        Ok(records
            .iter()
            .filter(|r| r.storage == storage)
            .cloned()
            .collect())
    }

    async fn fetch_modified_members(
        &self,
        project: &VscId,
        _since: &Watermark,
    ) -> SourceResult<Vec<VscId>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .get(project)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_account_quota(&self, id: &VscId) -> SourceResult<Vec<QuotaRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .account_quota
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_group_quota(&self, id: &VscId) -> SourceResult<Vec<QuotaRecord>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .group_quota
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_pubkeys(&self, id: &VscId) -> SourceResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .pubkeys
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn push_status(&self, id: &VscId, status: EntityStatus) -> SourceResult<()> {
        self.pushes.lock().unwrap().push((id.clone(), status));
        if let Some(account) = self.state.lock().unwrap().accounts.get_mut(id) {
            account.status = status;
        }
        Ok(())
    }
}

// =============================================================================
// Recording storage backend
// =============================================================================

/// One call made against a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BackendCall {
    FilesetExists(String),
    CreateHierarchy(PathBuf),
    CreateFileset { path: PathBuf, name: String },
    SetOwner { uid: u32, gid: u32, path: PathBuf },
    SetMode { mode: u32, path: PathBuf },
    SetFilesetQuota { soft: u64, path: PathBuf, name: String, hard: u64 },
    SetGrace { path: PathBuf, secs: u64 },
    CreateOwnedDirectory { path: PathBuf, mode: u32, uid: u32, gid: u32 },
    SetUserQuota { soft: u64, uid: u32, path: PathBuf, hard: u64 },
    CreateOwnedFile { path: PathBuf, mode: u32, uid: u32, gid: u32 },
}

impl BackendCall {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, BackendCall::FilesetExists(_))
    }
}

/// Backend that records calls and keeps an in-memory view of what exists.
pub struct RecordingBackend {
    calls: Mutex<Vec<BackendCall>>,
    filesets: Mutex<BTreeSet<String>>,
    entries: Mutex<BTreeSet<PathBuf>>,
    created: AtomicUsize,
    failing_paths: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            filesets: Mutex::new(BTreeSet::new()),
            entries: Mutex::new(BTreeSet::new()),
            created: AtomicUsize::new(0),
            failing_paths: Mutex::new(Vec::new()),
        }
    }

    /// Mark a fileset as already present.
    pub fn with_fileset(self, name: &str) -> Self {
        self.filesets.lock().unwrap().insert(name.to_string());
        self
    }

    /// Fail every mutation on a path containing `fragment`.
    pub fn with_failing_path(self, fragment: &str) -> Self {
        self.failing_paths.lock().unwrap().push(fragment.to_string());
        self
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<BackendCall> {
        self.calls().into_iter().filter(BackendCall::is_mutation).collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Filesets, directories and files actually created.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.entries.lock().unwrap().contains(Path::new(path))
    }

    fn record(&self, call: BackendCall, path: &Path) -> StorageResult<()> {
        self.calls.lock().unwrap().push(call);
        let display = path.to_string_lossy();
        if self
            .failing_paths
            .lock()
            .unwrap()
            .iter()
            .any(|fragment| display.contains(fragment.as_str()))
        {
            return Err(StorageError::CommandFailed {
                program: "mmsetquota".to_string(),
                args: display.into_owned(),
                status: 1,
                stderr: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn insert(&self, path: &Path) -> bool {
        let created = self.entries.lock().unwrap().insert(path.to_path_buf());
        if created {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        created
    }
}

#[async_trait]
impl StorageBackend for RecordingBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Gpfs
    }

    fn display_name(&self) -> &str {
        "recording"
    }

    async fn fileset_exists(&self, _filesystem: &str, name: &str) -> StorageResult<bool> {
        self.calls
            .lock()
            .unwrap()
            .push(BackendCall::FilesetExists(name.to_string()));
        Ok(self.filesets.lock().unwrap().contains(name))
    }

    async fn create_directory_hierarchy(&self, path: &Path) -> StorageResult<()> {
        self.record(BackendCall::CreateHierarchy(path.to_path_buf()), path)
    }

    async fn create_fileset(&self, path: &Path, name: &str) -> StorageResult<()> {
        self.record(
            BackendCall::CreateFileset {
                path: path.to_path_buf(),
                name: name.to_string(),
            },
            path,
        )?;
        if self.filesets.lock().unwrap().insert(name.to_string()) {
            self.created.fetch_add(1, Ordering::SeqCst);
        }
        self.entries.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    async fn set_owner(&self, uid: u32, gid: u32, path: &Path) -> StorageResult<()> {
        self.record(
            BackendCall::SetOwner {
                uid,
                gid,
                path: path.to_path_buf(),
            },
            path,
        )
    }

    async fn set_mode(&self, mode: u32, path: &Path) -> StorageResult<()> {
        self.record(
            BackendCall::SetMode {
                mode,
                path: path.to_path_buf(),
            },
            path,
        )
    }

    async fn set_fileset_quota(
        &self,
        soft: u64,
        path: &Path,
        name: &str,
        hard: u64,
    ) -> StorageResult<()> {
        self.record(
            BackendCall::SetFilesetQuota {
                soft,
                path: path.to_path_buf(),
                name: name.to_string(),
                hard,
            },
            path,
        )
    }

    async fn set_fileset_grace(&self, path: &Path, grace: Duration) -> StorageResult<()> {
        self.record(
            BackendCall::SetGrace {
                path: path.to_path_buf(),
                secs: grace.as_secs(),
            },
            path,
        )
    }

    async fn create_owned_directory(
        &self,
        path: &Path,
        mode: u32,
        uid: u32,
        gid: u32,
        _override_permissions: bool,
    ) -> StorageResult<bool> {
        self.record(
            BackendCall::CreateOwnedDirectory {
                path: path.to_path_buf(),
                mode,
                uid,
                gid,
            },
            path,
        )?;
        Ok(self.insert(path))
    }

    async fn set_user_quota(
        &self,
        soft: u64,
        uid: u32,
        path: &Path,
        hard: u64,
    ) -> StorageResult<()> {
        self.record(
            BackendCall::SetUserQuota {
                soft,
                uid,
                path: path.to_path_buf(),
                hard,
            },
            path,
        )
    }

    async fn create_owned_file(
        &self,
        path: &Path,
        _contents: &[u8],
        mode: u32,
        uid: u32,
        gid: u32,
    ) -> StorageResult<bool> {
        self.record(
            BackendCall::CreateOwnedFile {
                path: path.to_path_buf(),
                mode,
                uid,
                gid,
            },
            path,
        )?;
        Ok(self.insert(path))
    }
}

// =============================================================================
// In-memory watermark store
// =============================================================================

pub struct MemoryWatermarkStore {
    value: Mutex<Option<Watermark>>,
    fail_load: AtomicBool,
    fail_store: AtomicBool,
    stores: AtomicUsize,
}

impl MemoryWatermarkStore {
    pub fn new(initial: Option<Watermark>) -> Self {
        Self {
            value: Mutex::new(initial),
            fail_load: AtomicBool::new(false),
            fail_store: AtomicBool::new(false),
            stores: AtomicUsize::new(0),
        }
    }

    pub fn with_failing_load(self) -> Self {
        self.fail_load.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_store(self) -> Self {
        self.fail_store.store(true, Ordering::SeqCst);
        self
    }

    pub fn current(&self) -> Option<Watermark> {
        *self.value.lock().unwrap()
    }

    pub fn store_calls(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }
}

fn unavailable() -> WatermarkError {
    WatermarkError::Io {
        path: PathBuf::from("/var/cache/vsc-sync/timestamp"),
        source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only filesystem"),
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn load(&self) -> Result<Option<Watermark>, WatermarkError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.current())
    }

    async fn store(&self, watermark: &Watermark) -> Result<(), WatermarkError> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        if self.fail_store.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        *self.value.lock().unwrap() = Some(*watermark);
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub const HOME: &str = "VSC_HOME";
pub const DATA: &str = "VSC_DATA";
pub const SCRATCH: &str = "VSC_SCRATCH_KYUKON";

pub fn definitions() -> Vec<StorageDefinition> {
    let user_path = PathTemplate::new("{institute}/{prefix}/{id}").unwrap();
    vec![
        StorageDefinition::new(HOME, "kyukonhome", BackendKind::Gpfs, "/user/home")
            .with_user_path(user_path.clone()),
        StorageDefinition::new(DATA, "kyukondata", BackendKind::Gpfs, "/user/data")
            .with_user_path(user_path)
            .with_replication(2),
        StorageDefinition::new(SCRATCH, "kyukon", BackendKind::Gpfs, "/scratch")
            .with_project_path(PathTemplate::new("projects/{id}").unwrap())
            .with_replication(2),
    ]
}

/// Registry with every storage backed by `backend`, optionally through dry-run.
pub fn registry(backend: &Arc<RecordingBackend>, dry_run: bool) -> StorageRegistry {
    registry_from(definitions(), backend, dry_run)
}

pub fn registry_from(
    definitions: Vec<StorageDefinition>,
    backend: &Arc<RecordingBackend>,
    dry_run: bool,
) -> StorageRegistry {
    let mut registry = StorageRegistry::new();
    for definition in definitions {
        let inner: Arc<dyn StorageBackend> = backend.clone();
        let adapter: Arc<dyn StorageBackend> = if dry_run {
            Arc::new(DryRunBackend::new(inner))
        } else {
            inner
        };
        registry.insert(StorageHandle::new(definition, adapter));
    }
    registry
}

pub fn context(source: &Arc<MockSource>, storages: StorageRegistry, dry_run: bool) -> SyncContext {
    let inner: Arc<dyn EntitySource> = source.clone();
    SyncContext::new(
        inner,
        storages,
        QuotaPolicy::new(0.95).unwrap(),
        Fraction::new(0.5).unwrap(),
    )
    .with_dry_run(dry_run)
    .with_nobody_uid(NOBODY)
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        users: Some(UserSettings::new(HOME).with_data_storage(DATA).with_institute("gent")),
        projects: Some(ProjectSettings::new(SCRATCH, "proj_").with_institute("gent")),
    }
}

pub fn engine(store: &Arc<MemoryWatermarkStore>) -> ReconciliationEngine {
    let watermarks: Arc<dyn WatermarkStore> = store.clone();
    ReconciliationEngine::new(engine_config(), watermarks)
}
