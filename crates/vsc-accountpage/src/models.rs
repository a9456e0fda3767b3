//! Account page wire payloads.
//!
//! The REST API returns loosely typed JSON. Every payload is decoded into a
//! struct declaring which fields are required, then converted into the typed
//! records of `vsc-core`. Unknown fields are ignored.

use serde::{Deserialize, Serialize};
use vsc_core::{Account, EntityStatus, Group, QuotaRecord, VscId};

use crate::error::SourceResult;

/// `institute` object.
#[derive(Debug, Clone, Deserialize)]
pub struct InstitutePayload {
    pub name: String,
}

/// `person` object embedded in an account.
#[derive(Debug, Clone, Deserialize)]
pub struct PersonPayload {
    #[serde(default)]
    pub gecos: Option<String>,
    pub institute: InstitutePayload,
    #[serde(default)]
    pub institute_login: Option<String>,
}

/// `api/account/<id>/`
#[derive(Debug, Clone, Deserialize)]
pub struct AccountPayload {
    pub vsc_id: String,
    pub status: EntityStatus,
    pub vsc_id_number: u32,
    pub person: PersonPayload,
    #[serde(default)]
    pub home_directory: Option<String>,
    #[serde(default)]
    pub login_shell: Option<String>,
}

impl AccountPayload {
    #[must_use]
    pub fn institute(&self) -> &str {
        &self.person.institute.name
    }

    /// Convert to an [`Account`].
    ///
    /// Without an explicit personal group number the account number is used;
    /// the account page issues both from the same sequence.
    pub fn into_account(self, gid: Option<u32>) -> SourceResult<Account> {
        Ok(Account {
            vsc_id: VscId::new(self.vsc_id)?,
            uid: self.vsc_id_number,
            gid: gid.unwrap_or(self.vsc_id_number),
            status: self.status,
            institute: self.person.institute.name,
        })
    }
}

/// `api/account/<id>/usergroup/`
#[derive(Debug, Clone, Deserialize)]
pub struct UserGroupPayload {
    pub vsc_id: String,
    pub vsc_id_number: u32,
}

/// `api/vo/<id>/`, `api/group/modified/<ts>/`
#[derive(Debug, Clone, Deserialize)]
pub struct GroupPayload {
    pub vsc_id: String,
    pub status: EntityStatus,
    pub vsc_id_number: u32,
    pub institute: InstitutePayload,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub moderators: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl GroupPayload {
    #[must_use]
    pub fn institute(&self) -> &str {
        &self.institute.name
    }

    pub fn into_group(self) -> SourceResult<Group> {
        Ok(Group {
            vsc_id: VscId::new(self.vsc_id)?,
            gid: self.vsc_id_number,
            status: self.status,
            institute: self.institute.name,
            moderators: parse_ids(self.moderators)?,
            members: parse_ids(self.members)?,
        })
    }
}

fn parse_ids(raw: Vec<String>) -> SourceResult<Vec<VscId>> {
    raw.into_iter()
        .map(|id| VscId::new(id).map_err(Into::into))
        .collect()
}

/// `storage` object of a quota record.
#[derive(Debug, Clone, Deserialize)]
pub struct StoragePayload {
    pub name: String,
    #[serde(default)]
    pub storage_type: Option<String>,
}

/// `api/quota/user/...`, `api/account/<id>/quota/`
#[derive(Debug, Clone, Deserialize)]
pub struct UserQuotaPayload {
    pub user: String,
    pub storage: StoragePayload,
    pub fileset: String,
    pub hard: u64,
}

impl UserQuotaPayload {
    pub fn into_record(self) -> SourceResult<QuotaRecord> {
        Ok(QuotaRecord {
            owner: VscId::new(self.user)?,
            storage: self.storage.name,
            fileset: self.fileset,
            hard_kib: self.hard,
        })
    }
}

/// `api/quota/vo/...`, `api/vo/<id>/quota/`
#[derive(Debug, Clone, Deserialize)]
pub struct VoQuotaPayload {
    pub virtual_organisation: String,
    pub storage: StoragePayload,
    pub fileset: String,
    pub hard: u64,
}

impl VoQuotaPayload {
    pub fn into_record(self) -> SourceResult<QuotaRecord> {
        Ok(QuotaRecord {
            owner: VscId::new(self.virtual_organisation)?,
            storage: self.storage.name,
            fileset: self.fileset,
            hard_kib: self.hard,
        })
    }
}

/// `api/account/<id>/pubkey/`
#[derive(Debug, Clone, Deserialize)]
pub struct PubkeyPayload {
    pub pubkey: String,
    #[serde(default)]
    pub deleted: bool,
}

/// Entry of `api/vo/<id>/member/modified/<ts>/`.
#[derive(Debug, Clone, Deserialize)]
pub struct MemberPayload {
    pub vsc_id: String,
}

/// Body of the status `PATCH`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate<'a> {
    pub status: &'a str,
}
