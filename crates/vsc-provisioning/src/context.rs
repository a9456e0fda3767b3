//! Per-pass context threaded through the engine and provisioners.

use std::fmt;
use std::sync::Arc;
use tracing::{info_span, warn, Span};
use uuid::Uuid;
use vsc_accountpage::EntitySource;
use vsc_core::{Fraction, QuotaPolicy};
use vsc_storage::StorageRegistry;

/// uid used when the local `nobody` account cannot be resolved.
pub const FALLBACK_NOBODY_UID: u32 = 65534;

/// Default share of a project quota granted to each member.
pub const DEFAULT_MEMBER_SHARE: f64 = 0.5;

/// Everything a pass needs, built once per run.
///
/// Backends in `storages` are already wrapped for dry-run when `dry_run` is
/// set; the flag itself only gates status pushes and the watermark commit.
#[derive(Clone)]
pub struct SyncContext {
    run_id: Uuid,
    dry_run: bool,
    span: Span,
    policy: QuotaPolicy,
    member_share: Fraction,
    nobody_uid: u32,
    source: Arc<dyn EntitySource>,
    storages: StorageRegistry,
}

impl SyncContext {
    /// Create a context with a fresh run id.
    pub fn new(
        source: Arc<dyn EntitySource>,
        storages: StorageRegistry,
        policy: QuotaPolicy,
        member_share: Fraction,
    ) -> Self {
        let run_id = Uuid::new_v4();
        Self {
            run_id,
            dry_run: false,
            span: pass_span(run_id, false),
            policy,
            member_share,
            nobody_uid: FALLBACK_NOBODY_UID,
            source,
            storages,
        }
    }

    /// Enable or disable dry-run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self.span = pass_span(self.run_id, dry_run);
        self
    }

    /// Override the fallback owner uid.
    #[must_use]
    pub fn with_nobody_uid(mut self, uid: u32) -> Self {
        self.nobody_uid = uid;
        self
    }

    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// The `sync_pass` span every pass runs in.
    #[must_use]
    pub fn span(&self) -> &Span {
        &self.span
    }

    #[must_use]
    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    #[must_use]
    pub fn member_share(&self) -> Fraction {
        self.member_share
    }

    #[must_use]
    pub fn nobody_uid(&self) -> u32 {
        self.nobody_uid
    }

    pub fn source(&self) -> &dyn EntitySource {
        self.source.as_ref()
    }

    #[must_use]
    pub fn storages(&self) -> &StorageRegistry {
        &self.storages
    }
}

impl fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncContext")
            .field("run_id", &self.run_id)
            .field("dry_run", &self.dry_run)
            .field("policy", &self.policy)
            .field("member_share", &self.member_share)
            .field("nobody_uid", &self.nobody_uid)
            .field("storages", &self.storages)
            .finish_non_exhaustive()
    }
}

fn pass_span(run_id: Uuid, dry_run: bool) -> Span {
    info_span!("sync_pass", run_id = %run_id, dry_run)
}

/// Look up the uid of the local `nobody` account.
#[must_use]
pub fn resolve_nobody_uid() -> u32 {
    match nix::unistd::User::from_name("nobody") {
        Ok(Some(user)) => user.uid.as_raw(),
        Ok(None) => {
            warn!(uid = FALLBACK_NOBODY_UID, "No 'nobody' account, using fallback uid");
            FALLBACK_NOBODY_UID
        }
        Err(e) => {
            warn!(error = %e, uid = FALLBACK_NOBODY_UID, "Cannot look up 'nobody', using fallback uid");
            FALLBACK_NOBODY_UID
        }
    }
}
