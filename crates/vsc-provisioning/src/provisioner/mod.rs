//! Per-entity provisioning.
//!
//! Each entity kind has a provisioner that loads the authoritative record
//! and then walks an ordered list of idempotent storage steps. Running a
//! provisioner twice against an unchanged record re-asserts the same state.

pub mod home;
pub mod project;
pub mod user;

use async_trait::async_trait;
use tracing::error;
use vsc_core::{EntityKind, VscId};

use crate::context::SyncContext;
use crate::error::{ProvisionError, ProvisionResult};

pub use home::{populate_home, PopulateReport};
pub use project::{MemberReport, ProjectProvisioner, ProjectSettings};
pub use user::{apply_user_quota, ProvisionedUser, UserProvisioner, UserSettings};

/// Something whose storage state can be brought in line with its record.
#[async_trait]
pub trait Provisionable: Send {
    /// What a successful run reports back.
    type Outcome: Send;

    /// Identifier of the entity.
    fn entity_id(&self) -> &VscId;

    /// Kind of the entity.
    fn kind(&self) -> EntityKind;

    /// Run every storage step for this entity.
    async fn ensure_storage_state(&mut self, ctx: &SyncContext) -> ProvisionResult<Self::Outcome>;
}

/// Result of provisioning one entity.
#[derive(Debug)]
pub enum EntityOutcome<T> {
    /// Every step succeeded.
    Provisioned { id: VscId, report: T },
    /// A step failed; later steps were not attempted.
    Failed {
        id: VscId,
        kind: EntityKind,
        error: ProvisionError,
    },
}

impl<T> EntityOutcome<T> {
    /// A failure before a provisioner could be built.
    pub fn failed(id: VscId, kind: EntityKind, error: ProvisionError) -> Self {
        EntityOutcome::Failed { id, kind, error }
    }

    #[must_use]
    pub fn id(&self) -> &VscId {
        match self {
            EntityOutcome::Provisioned { id, .. } | EntityOutcome::Failed { id, .. } => id,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, EntityOutcome::Provisioned { .. })
    }

    /// Log a failure with its identifying context.
    pub fn log_failure(&self, storage: &str) {
        if let EntityOutcome::Failed { id, kind, error } = self {
            error!(
                entity_id = %id,
                kind = %kind,
                storage = %storage,
                transient = error.is_transient(),
                error = %error,
                "Provisioning failed"
            );
        }
    }
}

/// Run a provisioner and capture its result as a value.
pub async fn provision<P: Provisionable>(
    ctx: &SyncContext,
    mut provisioner: P,
) -> EntityOutcome<P::Outcome> {
    let id = provisioner.entity_id().clone();
    let kind = provisioner.kind();
    match provisioner.ensure_storage_state(ctx).await {
        Ok(report) => EntityOutcome::Provisioned { id, report },
        Err(error) => EntityOutcome::Failed { id, kind, error },
    }
}
