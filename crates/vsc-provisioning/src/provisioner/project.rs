//! Project and virtual organisation provisioning.
//!
//! A project gets one fileset on the project storage, owned by its first
//! moderator and the project group. Every member whose membership changed
//! since the watermark gets a share of the project quota and a personal
//! directory inside the fileset. Member failures are reported per member and
//! never fail the project itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, error, info};
use vsc_core::{EntityKind, Group, QuotaLimits, QuotaRecord, VscId, Watermark};
use vsc_storage::{PathKind, StorageBackend, StorageDefinition};

use crate::context::SyncContext;
use crate::error::{ProvisionError, ProvisionResult};
use crate::provisioner::Provisionable;

/// Which projects are provisioned, and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSettings {
    /// Only projects of this institute are processed.
    #[serde(default)]
    pub institute: Option<String>,

    /// Storage holding project filesets.
    pub storage: String,

    /// Name prefix that distinguishes projects from other groups.
    pub prefix: String,

    /// Groups that are never provisioned (institute default VOs).
    #[serde(default)]
    pub excluded: Vec<VscId>,

    /// Mode of the project fileset root.
    #[serde(default = "default_fileset_mode")]
    pub fileset_mode: u32,

    /// Mode of member directories.
    #[serde(default = "default_member_mode")]
    pub member_mode: u32,
}

fn default_fileset_mode() -> u32 {
    0o770
}

fn default_member_mode() -> u32 {
    0o700
}

impl ProjectSettings {
    pub fn new(storage: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            institute: None,
            storage: storage.into(),
            prefix: prefix.into(),
            excluded: Vec::new(),
            fileset_mode: default_fileset_mode(),
            member_mode: default_member_mode(),
        }
    }

    #[must_use]
    pub fn with_institute(mut self, institute: impl Into<String>) -> Self {
        self.institute = Some(institute.into());
        self
    }

    #[must_use]
    pub fn with_excluded(mut self, id: VscId) -> Self {
        self.excluded.push(id);
        self
    }

    /// Whether `id` is a project these settings provision.
    #[must_use]
    pub fn selects(&self, id: &VscId) -> bool {
        id.has_prefix(&self.prefix) && !self.excluded.contains(id)
    }
}

/// What provisioning one project did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberReport {
    /// The fileset did not exist before.
    pub created_fileset: bool,
    /// uid the fileset was handed to.
    pub owner_uid: u32,
    /// Members provisioned.
    pub ok: Vec<VscId>,
    /// Members that failed.
    pub failed: Vec<VscId>,
}

/// Provisions one project.
pub struct ProjectProvisioner<'a> {
    settings: &'a ProjectSettings,
    group: Group,
    quota: Vec<QuotaRecord>,
    since: Watermark,
}

impl<'a> ProjectProvisioner<'a> {
    /// Fetch the group and its quota.
    pub async fn load(
        ctx: &SyncContext,
        settings: &'a ProjectSettings,
        id: &VscId,
        since: Watermark,
    ) -> ProvisionResult<Self> {
        let group = ctx.source().fetch_group(id).await?;
        let quota = ctx.source().fetch_group_quota(id).await?;
        Ok(Self::from_parts(settings, group, quota, since))
    }

    #[must_use]
    pub fn from_parts(
        settings: &'a ProjectSettings,
        group: Group,
        quota: Vec<QuotaRecord>,
        since: Watermark,
    ) -> Self {
        Self {
            settings,
            group,
            quota,
            since,
        }
    }

    #[must_use]
    pub fn group(&self) -> &Group {
        &self.group
    }

    /// uid of the first moderator, or `nobody`.
    async fn resolve_owner(&self, ctx: &SyncContext) -> u32 {
        let Some(moderator) = self.group.moderators.first() else {
            error!(
                entity_id = %self.group.vsc_id,
                uid = ctx.nobody_uid(),
                "Project has no moderator, fileset goes to nobody"
            );
            return ctx.nobody_uid();
        };
        match ctx.source().fetch_account(moderator).await {
            Ok(account) => account.uid,
            Err(e) => {
                error!(
                    entity_id = %self.group.vsc_id,
                    moderator = %moderator,
                    uid = ctx.nobody_uid(),
                    error = %e,
                    "Moderator lookup failed, fileset goes to nobody"
                );
                ctx.nobody_uid()
            }
        }
    }

    /// Project quota from the account page, else the storage default.
    fn project_limits(
        &self,
        ctx: &SyncContext,
        definition: &StorageDefinition,
    ) -> ProvisionResult<QuotaLimits> {
        let replication = definition.data_replication_factor;
        if let Some(record) = self
            .quota
            .iter()
            .find(|record| record.storage == definition.name)
        {
            return Ok(record.limits(replication, ctx.policy()));
        }

        let kib = definition.default_project_quota_kib.ok_or_else(|| {
            ProvisionError::MissingQuota {
                entity: self.group.vsc_id.clone(),
                storage: definition.name.clone(),
            }
        })?;
        error!(
            entity_id = %self.group.vsc_id,
            storage = %definition.name,
            default_kib = kib,
            "No project quota in the account page, using the storage default"
        );
        Ok(QuotaLimits::from_kib(kib, replication, ctx.policy()))
    }

    async fn provision_member(
        &self,
        ctx: &SyncContext,
        backend: &dyn StorageBackend,
        fileset: &Path,
        member: &VscId,
        limits: QuotaLimits,
    ) -> ProvisionResult<()> {
        let account = ctx.source().fetch_account(member).await?;
        backend
            .set_user_quota(limits.soft, account.uid, fileset, limits.hard)
            .await?;
        backend
            .create_owned_directory(
                &fileset.join(member.as_str()),
                self.settings.member_mode,
                account.uid,
                account.gid,
                false,
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Provisionable for ProjectProvisioner<'_> {
    type Outcome = MemberReport;

    fn entity_id(&self) -> &VscId {
        &self.group.vsc_id
    }

    fn kind(&self) -> EntityKind {
        EntityKind::Project
    }

    async fn ensure_storage_state(&mut self, ctx: &SyncContext) -> ProvisionResult<MemberReport> {
        let handle = ctx.storages().get(&self.settings.storage)?;
        let definition = handle.definition.as_ref();
        let backend = handle.backend.as_ref();
        let id = &self.group.vsc_id;

        let owner_uid = self.resolve_owner(ctx).await;
        let gid = self.group.gid;
        let path = definition.path_for(PathKind::Project, id, &self.group.institute)?;

        let created_fileset = if backend
            .fileset_exists(&definition.filesystem, id.as_str())
            .await?
        {
            debug!(entity_id = %id, storage = %definition.name, "Fileset already exists");
            false
        } else {
            if let Some(parent) = path.parent() {
                backend.create_directory_hierarchy(parent).await?;
            }
            backend.create_fileset(&path, id.as_str()).await?;
            info!(entity_id = %id, storage = %definition.name, path = %path.display(), "Created fileset");
            true
        };

        backend
            .set_mode(self.settings.fileset_mode, &path)
            .await?;
        backend.set_owner(owner_uid, gid, &path).await?;

        let limits = self.project_limits(ctx, definition)?;
        backend
            .set_fileset_quota(limits.soft, &path, id.as_str(), limits.hard)
            .await?;
        backend
            .set_fileset_grace(&path, definition.grace_period())
            .await?;

        let members = ctx
            .source()
            .fetch_modified_members(id, &self.since)
            .await?;
        let member_limits = limits.share(ctx.member_share(), ctx.policy());

        let mut ok = Vec::new();
        let mut failed = Vec::new();
        for member in members {
            match self
                .provision_member(ctx, backend, &path, &member, member_limits)
                .await
            {
                Ok(()) => ok.push(member),
                Err(e) => {
                    error!(
                        entity_id = %id,
                        member = %member,
                        storage = %definition.name,
                        error = %e,
                        "Member provisioning failed"
                    );
                    failed.push(member);
                }
            }
        }

        Ok(MemberReport {
            created_fileset,
            owner_uid,
            ok,
            failed,
        })
    }
}
