//! User provisioning: home and data directories, quota, status push.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};
use vsc_core::{Account, EntityKind, EntityStatus, QuotaLimits, QuotaRecord, VscId};
use vsc_storage::{PathKind, StorageHandle};

use crate::context::SyncContext;
use crate::error::ProvisionResult;
use crate::provisioner::home::{populate_home, PopulateReport};
use crate::provisioner::Provisionable;

/// Which storages hold user directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Only accounts of this institute are processed.
    #[serde(default)]
    pub institute: Option<String>,

    /// Storage holding home directories.
    pub home_storage: String,

    /// Storage holding data directories, if any.
    #[serde(default)]
    pub data_storage: Option<String>,

    /// Storages whose user quota changes are applied; home and data when empty.
    #[serde(default)]
    pub quota_storages: Vec<String>,

    /// Mode of home and data directories.
    #[serde(default = "default_directory_mode")]
    pub directory_mode: u32,

    /// Whether new home directories get the baseline files.
    #[serde(default = "default_populate_home")]
    pub populate_home: bool,
}

fn default_directory_mode() -> u32 {
    0o700
}

fn default_populate_home() -> bool {
    true
}

impl UserSettings {
    /// Settings with only a home storage.
    pub fn new(home_storage: impl Into<String>) -> Self {
        Self {
            institute: None,
            home_storage: home_storage.into(),
            data_storage: None,
            quota_storages: Vec::new(),
            directory_mode: default_directory_mode(),
            populate_home: default_populate_home(),
        }
    }

    #[must_use]
    pub fn with_data_storage(mut self, storage: impl Into<String>) -> Self {
        self.data_storage = Some(storage.into());
        self
    }

    #[must_use]
    pub fn with_institute(mut self, institute: impl Into<String>) -> Self {
        self.institute = Some(institute.into());
        self
    }

    /// Storages scanned for quota changes.
    #[must_use]
    pub fn quota_storages(&self) -> Vec<&str> {
        if !self.quota_storages.is_empty() {
            return self.quota_storages.iter().map(String::as_str).collect();
        }
        let mut storages = vec![self.home_storage.as_str()];
        if let Some(data) = self.data_storage.as_deref() {
            if data != self.home_storage {
                storages.push(data);
            }
        }
        storages
    }

    /// Every storage these settings refer to.
    pub fn referenced_storages(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.home_storage.as_str())
            .chain(self.data_storage.as_deref())
            .chain(self.quota_storages.iter().map(String::as_str))
    }
}

/// What provisioning one user did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedUser {
    /// The home directory did not exist before.
    pub created_home: bool,
    /// The data directory did not exist before.
    pub created_data: bool,
    /// Baseline files written into the home directory.
    pub populated: PopulateReport,
    /// Status pushed back to the account page.
    pub pushed_status: Option<EntityStatus>,
}

/// Provisions one account.
pub struct UserProvisioner<'a> {
    settings: &'a UserSettings,
    account: Account,
    quota: Vec<QuotaRecord>,
}

impl<'a> UserProvisioner<'a> {
    /// Fetch the account and its quota.
    pub async fn load(
        ctx: &SyncContext,
        settings: &'a UserSettings,
        id: &VscId,
    ) -> ProvisionResult<Self> {
        let account = ctx.source().fetch_account(id).await?;
        let quota = ctx.source().fetch_account_quota(id).await?;
        Ok(Self::from_parts(settings, account, quota))
    }

    /// Build from already fetched records.
    #[must_use]
    pub fn from_parts(settings: &'a UserSettings, account: Account, quota: Vec<QuotaRecord>) -> Self {
        Self {
            settings,
            account,
            quota,
        }
    }

    #[must_use]
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// Create the user directory on one storage and apply its quota.
    async fn ensure_user_directory(
        &self,
        ctx: &SyncContext,
        handle: &StorageHandle,
    ) -> ProvisionResult<bool> {
        let account = &self.account;
        let definition = &handle.definition;
        let backend = handle.backend.as_ref();
        let path = definition.path_for(PathKind::User, &account.vsc_id, &account.institute)?;

        if let Some(parent) = path.parent() {
            backend.create_directory_hierarchy(parent).await?;
        }
        let created = backend
            .create_owned_directory(
                &path,
                self.settings.directory_mode,
                account.uid,
                account.gid,
                false,
            )
            .await?;

        let kib = self
            .quota
            .iter()
            .find(|record| record.storage == definition.name)
            .map(|record| record.hard_kib)
            .or(definition.default_user_quota_kib);
        match kib {
            Some(kib) => {
                let limits =
                    QuotaLimits::from_kib(kib, definition.data_replication_factor, ctx.policy());
                backend
                    .set_user_quota(limits.soft, account.uid, quota_target(&path), limits.hard)
                    .await?;
            }
            None => warn!(
                entity_id = %account.vsc_id,
                storage = %definition.name,
                "No user quota and no default, leaving quota untouched"
            ),
        }

        debug!(
            entity_id = %account.vsc_id,
            storage = %definition.name,
            path = %path.display(),
            created,
            "User directory in place"
        );
        Ok(created)
    }
}

#[async_trait]
impl Provisionable for UserProvisioner<'_> {
    type Outcome = ProvisionedUser;

    fn entity_id(&self) -> &VscId {
        &self.account.vsc_id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::User
    }

    async fn ensure_storage_state(&mut self, ctx: &SyncContext) -> ProvisionResult<ProvisionedUser> {
        let home = ctx.storages().get(&self.settings.home_storage)?;
        let created_home = self.ensure_user_directory(ctx, home).await?;

        let mut populated = PopulateReport::default();
        if self.settings.populate_home {
            let path = home.definition.path_for(
                PathKind::User,
                &self.account.vsc_id,
                &self.account.institute,
            )?;
            let pubkeys = ctx.source().fetch_pubkeys(&self.account.vsc_id).await?;
            populated =
                populate_home(home.backend.as_ref(), &path, &self.account, &pubkeys).await?;
        }

        let mut created_data = false;
        if let Some(data) = self.settings.data_storage.as_deref() {
            let data = ctx.storages().get(data)?;
            created_data = self.ensure_user_directory(ctx, data).await?;
        }

        let mut pushed_status = None;
        if let Some(next) = self.account.status.after_provisioning() {
            if ctx.dry_run() {
                info!(
                    entity_id = %self.account.vsc_id,
                    from = %self.account.status,
                    to = %next,
                    "(dryrun) Not pushing status"
                );
            } else {
                ctx.source().push_status(&self.account.vsc_id, next).await?;
                info!(
                    entity_id = %self.account.vsc_id,
                    from = %self.account.status,
                    to = %next,
                    "Pushed status"
                );
                self.account.status = next;
                pushed_status = Some(next);
            }
        }

        Ok(ProvisionedUser {
            created_home,
            created_data,
            populated,
            pushed_status,
        })
    }
}

/// Apply one changed user quota record.
pub async fn apply_user_quota(ctx: &SyncContext, record: &QuotaRecord) -> ProvisionResult<()> {
    let handle = ctx.storages().get(&record.storage)?;
    let definition = &handle.definition;
    let account = ctx.source().fetch_account(&record.owner).await?;
    let path = definition.path_for(PathKind::User, &account.vsc_id, &account.institute)?;
    let limits = record.limits(definition.data_replication_factor, ctx.policy());

    handle
        .backend
        .set_user_quota(limits.soft, account.uid, quota_target(&path), limits.hard)
        .await?;
    debug!(
        entity_id = %record.owner,
        storage = %definition.name,
        hard = limits.hard,
        soft = limits.soft,
        "Applied user quota"
    );
    Ok(())
}

/// User quota lives on the fileset grouping the user directories.
fn quota_target(path: &Path) -> &Path {
    path.parent().unwrap_or(path)
}
