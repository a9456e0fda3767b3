//! The entity source interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use vsc_core::{Account, Entity, EntityKind, EntityStatus, Group, QuotaRecord, VscId, Watermark};

use crate::error::SourceResult;

/// Selects which changed entities a pass is interested in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Only entities of this institute.
    pub institute: Option<String>,
    /// Only entities whose id starts with this prefix.
    pub prefix: Option<String>,
}

impl ChangeFilter {
    /// A filter that accepts everything.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_institute(mut self, institute: impl Into<String>) -> Self {
        self.institute = Some(institute.into());
        self
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Whether an entity passes the filter.
    #[must_use]
    pub fn matches(&self, entity: &Entity) -> bool {
        self.accepts(entity.entity_id().as_str(), entity.institute())
    }

    /// Whether a raw id and institute pass the filter, before any conversion.
    #[must_use]
    pub fn accepts(&self, id: &str, institute: &str) -> bool {
        let institute_ok = self
            .institute
            .as_deref()
            .map_or(true, |wanted| institute == wanted);
        let prefix_ok = self
            .prefix
            .as_deref()
            .map_or(true, |prefix| id.starts_with(prefix));
        institute_ok && prefix_ok
    }
}

/// Read access to the authoritative account store, plus the one status write.
///
/// Returned collections are in no particular order.
#[async_trait]
pub trait EntitySource: Send + Sync {
    /// The source's own clock.
    async fn server_time(&self) -> SourceResult<DateTime<Utc>>;

    /// Entities of `kind` modified after `since` that pass `filter`.
    async fn fetch_changed(
        &self,
        kind: EntityKind,
        since: &Watermark,
        filter: &ChangeFilter,
    ) -> SourceResult<Vec<Entity>>;

    /// One account, with its personal group resolved.
    async fn fetch_account(&self, id: &VscId) -> SourceResult<Account>;

    /// One group, project or virtual organisation.
    async fn fetch_group(&self, id: &VscId) -> SourceResult<Group>;

    /// Quota records of `kind` on `storage` modified after `since`.
    async fn fetch_quota_changes(
        &self,
        kind: EntityKind,
        storage: &str,
        since: &Watermark,
    ) -> SourceResult<Vec<QuotaRecord>>;

    /// Members of `project` whose membership changed after `since`.
    async fn fetch_modified_members(
        &self,
        project: &VscId,
        since: &Watermark,
    ) -> SourceResult<Vec<VscId>>;

    /// Every quota record of an account.
    async fn fetch_account_quota(&self, id: &VscId) -> SourceResult<Vec<QuotaRecord>>;

    /// Every quota record of a group.
    async fn fetch_group_quota(&self, id: &VscId) -> SourceResult<Vec<QuotaRecord>>;

    /// Public SSH keys of an account, deleted keys excluded.
    async fn fetch_pubkeys(&self, id: &VscId) -> SourceResult<Vec<String>>;

    /// Record a new status for an account.
    async fn push_status(&self, id: &VscId, status: EntityStatus) -> SourceResult<()>;
}
