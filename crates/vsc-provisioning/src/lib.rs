//! # VSC Provisioning
//!
//! Incremental reconciliation of the account page onto the storage
//! backends.
//!
//! ## Components
//!
//! - [`provisioner`] - per-entity provisioning (users, projects)
//! - [`engine`] - one synchronisation pass with failure isolation
//! - [`watermark`] - persistence of the last synchronised instant
//! - [`health`] - status, counters and the Nagios line
//! - [`coordinator`] - run lock and health cache around a pass
//!
//! ## Example
//!
//! ```ignore
//! use vsc_provisioning::prelude::*;
//!
//! let ctx = SyncContext::new(source, storages, policy, member_share).with_dry_run(true);
//! let engine = ReconciliationEngine::new(config, Arc::new(FileWatermarkStore::new(path)));
//! let mut coordinator = RunCoordinator::new(
//!     Box::new(FileRunLock::new("/var/run/vsc-sync.lock")),
//!     HealthCache::new("/var/cache/vsc-sync/health.json"),
//!     Thresholds::default(),
//! );
//! let report = coordinator.run(&engine, &ctx, &[EntityKind::User]).await;
//! println!("{}", report.nagios_line("vsc-sync"));
//! ```

pub mod context;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod health;
pub mod provisioner;
pub mod result_set;
pub mod watermark;

pub use context::{resolve_nobody_uid, SyncContext};
pub use coordinator::{
    CoordinatorError, CoordinatorResult, FileRunLock, HealthCache, RunCoordinator, RunLock,
};
pub use engine::{
    EngineConfig, PassPhase, PassSummary, ProjectPassResult, QuotaPassResult,
    ReconciliationEngine, UserPassResult,
};
pub use error::{EngineError, EngineResult, ProvisionError, ProvisionResult};
pub use health::{HealthReport, HealthStatus, Metric, Threshold, Thresholds};
pub use provisioner::{
    EntityOutcome, MemberReport, ProjectProvisioner, ProjectSettings, Provisionable,
    ProvisionedUser, UserProvisioner, UserSettings,
};
pub use result_set::ResultSet;
pub use watermark::{FileWatermarkStore, WatermarkError, WatermarkStore};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::context::SyncContext;
    pub use crate::coordinator::{FileRunLock, HealthCache, RunCoordinator, RunLock};
    pub use crate::engine::{EngineConfig, PassSummary, ReconciliationEngine};
    pub use crate::health::{HealthReport, HealthStatus, Thresholds};
    pub use crate::provisioner::{ProjectSettings, UserSettings};
    pub use crate::watermark::{FileWatermarkStore, WatermarkStore};
    pub use vsc_core::EntityKind;
}
