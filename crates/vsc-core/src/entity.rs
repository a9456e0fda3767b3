//! Typed records sourced from the account page.
//!
//! The account page is the source of truth; these records are built fresh
//! for every synchronisation pass and never persisted locally.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::VscId;
use crate::quota::{QuotaLimits, QuotaPolicy};

/// Kind of entity being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A VSC account.
    User,
    /// A project or virtual organisation.
    Project,
}

impl EntityKind {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Project => "project",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" | "users" => Ok(EntityKind::User),
            "project" | "projects" | "vo" | "vos" => Ok(EntityKind::Project),
            _ => Err(CoreError::UnknownKind(s.to_string())),
        }
    }
}

/// Lifecycle status of an account or group in the account page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    /// Freshly created, storage not yet provisioned.
    New,
    /// Modified since the last provisioning.
    Modified,
    /// Storage provisioned, downstream subsystems still to be notified.
    Notify,
    /// Fully active.
    Active,
    /// Deactivated.
    Inactive,
    /// Expired.
    Expired,
    /// Any status this tool does not act upon.
    #[serde(other)]
    Other,
}

impl EntityStatus {
    /// Get the string representation used by the account page.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::New => "new",
            EntityStatus::Modified => "modified",
            EntityStatus::Notify => "notify",
            EntityStatus::Active => "active",
            EntityStatus::Inactive => "inactive",
            EntityStatus::Expired => "expired",
            EntityStatus::Other => "other",
        }
    }

    /// The status to push once storage has been provisioned.
    ///
    /// Only `new` moves forward (to `notify`); every other status is left
    /// alone so re-running a pass never re-triggers downstream work.
    #[must_use]
    pub fn after_provisioning(&self) -> Option<EntityStatus> {
        match self {
            EntityStatus::New => Some(EntityStatus::Notify),
            _ => None,
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A VSC account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account name.
    pub vsc_id: VscId,
    /// Numeric user id.
    pub uid: u32,
    /// Numeric id of the account's personal user group.
    pub gid: u32,
    /// Current status.
    pub status: EntityStatus,
    /// Home institute (`gent`, `brussel`, ...).
    pub institute: String,
}

/// A project or virtual organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name.
    pub vsc_id: VscId,
    /// Numeric group id.
    pub gid: u32,
    /// Current status.
    pub status: EntityStatus,
    /// Home institute.
    pub institute: String,
    /// Moderators; the first one owns the project fileset.
    #[serde(default)]
    pub moderators: Vec<VscId>,
    /// Members.
    #[serde(default)]
    pub members: Vec<VscId>,
}

/// A changed entity as returned by the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(Account),
    Project(Group),
}

impl Entity {
    /// Identifier of the entity.
    #[must_use]
    pub fn entity_id(&self) -> &VscId {
        match self {
            Entity::User(account) => &account.vsc_id,
            Entity::Project(group) => &group.vsc_id,
        }
    }

    /// Kind discriminator.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::User(_) => EntityKind::User,
            Entity::Project(_) => EntityKind::Project,
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> EntityStatus {
        match self {
            Entity::User(account) => account.status,
            Entity::Project(group) => group.status,
        }
    }

    /// Home institute.
    #[must_use]
    pub fn institute(&self) -> &str {
        match self {
            Entity::User(account) => &account.institute,
            Entity::Project(group) => &group.institute,
        }
    }
}

/// Hard quota of one entity on one storage, as recorded in the account page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaRecord {
    /// Account or group the quota belongs to.
    pub owner: VscId,
    /// Storage (filesystem) name.
    pub storage: String,
    /// Fileset the quota applies to.
    pub fileset: String,
    /// Hard limit in KiB.
    pub hard_kib: u64,
}

impl QuotaRecord {
    /// Byte limits for this record on a backend with the given replication.
    #[must_use]
    pub fn limits(&self, replication_factor: u32, policy: &QuotaPolicy) -> QuotaLimits {
        QuotaLimits::from_kib(self.hard_kib, replication_factor, policy)
    }
}
