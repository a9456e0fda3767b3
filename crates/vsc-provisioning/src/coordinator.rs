//! Single-instance execution and health reporting around a pass.

use chrono::Utc;
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use vsc_core::EntityKind;

use crate::context::SyncContext;
use crate::engine::ReconciliationEngine;
use crate::health::{HealthReport, HealthStatus, Thresholds};

/// Default age after which a cached health report is no longer trusted.
pub const DEFAULT_MAX_CACHE_AGE: Duration = Duration::from_secs(900);

/// Lock attempts before a lock file that keeps being replaced counts as held.
const LOCK_ATTEMPTS: usize = 5;

/// Errors around locking and the health cache.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Another run holds the lock.
    #[error("another run holds {path}{}", holder_suffix(.holder))]
    AlreadyRunning {
        path: PathBuf,
        holder: Option<String>,
    },

    /// The lock could not be taken for another reason.
    #[error("cannot lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid health cache {path}: {source}")]
    CacheFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

fn holder_suffix(holder: &Option<String>) -> String {
    holder
        .as_deref()
        .map(|h| format!(" ({h})"))
        .unwrap_or_default()
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> CoordinatorError + '_ {
    move |source| CoordinatorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ============================================================================
// Run lock
// ============================================================================

/// Exclusive, system-wide run lock.
pub trait RunLock: Send {
    /// Take the lock without waiting.
    fn try_acquire(&mut self) -> CoordinatorResult<()>;

    /// Give the lock up. Releasing a lock that is not held is a no-op.
    fn release(&mut self) -> CoordinatorResult<()>;
}

/// `flock`-based lock on a well-known file holding the owner's PID.
pub struct FileRunLock {
    path: PathBuf,
    held: Option<Flock<File>>,
}

impl std::fmt::Debug for FileRunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRunLock")
            .field("path", &self.path)
            .field("held", &self.held.is_some())
            .finish()
    }
}

impl FileRunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: None,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn is_held(&self) -> bool {
        self.held.is_some()
    }

    fn holder(&self) -> Option<String> {
        let mut contents = String::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .ok()?;
        let trimmed = contents.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    fn open(&self) -> CoordinatorResult<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(io_error(&self.path))
    }

    /// Lock an opened lock file.
    ///
    /// `None` when the lock was taken on a file that is no longer the one at
    /// `path`: a previous holder unlinked it on release, and a lock on an
    /// orphaned inode excludes nobody.
    fn lock_opened(&self, file: File) -> CoordinatorResult<Option<Flock<File>>> {
        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                return Err(CoordinatorError::AlreadyRunning {
                    path: self.path.clone(),
                    holder: self.holder(),
                })
            }
            Err((_, source)) => {
                return Err(CoordinatorError::Lock {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if self.is_current(&lock)? {
            Ok(Some(lock))
        } else {
            debug!(path = %self.path.display(), "Lock file was replaced while locking");
            Ok(None)
        }
    }

    fn is_current(&self, file: &File) -> CoordinatorResult<bool> {
        let locked = file.metadata().map_err(io_error(&self.path))?;
        match std::fs::metadata(&self.path) {
            Ok(on_disk) => Ok(on_disk.dev() == locked.dev() && on_disk.ino() == locked.ino()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&self.path)(e)),
        }
    }
}

impl RunLock for FileRunLock {
    fn try_acquire(&mut self) -> CoordinatorResult<()> {
        if self.held.is_some() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error(parent))?;
        }

        let mut acquired = None;
        for _ in 0..LOCK_ATTEMPTS {
            let file = self.open()?;
            if let Some(lock) = self.lock_opened(file)? {
                acquired = Some(lock);
                break;
            }
        }
        let Some(mut lock) = acquired else {
            return Err(CoordinatorError::AlreadyRunning {
                path: self.path.clone(),
                holder: self.holder(),
            });
        };

        lock.set_len(0).map_err(io_error(&self.path))?;
        writeln!(lock, "pid {} since {}", std::process::id(), Utc::now().to_rfc3339())
            .map_err(io_error(&self.path))?;
        debug!(path = %self.path.display(), "Acquired run lock");
        self.held = Some(lock);
        Ok(())
    }

    fn release(&mut self) -> CoordinatorResult<()> {
        let Some(lock) = self.held.take() else {
            return Ok(());
        };
        // Unlink while still holding the lock so no waiter sees a stale PID.
        let removed = std::fs::remove_file(&self.path).map_err(io_error(&self.path));
        if let Err((_, source)) = lock.unlock() {
            return Err(CoordinatorError::Lock {
                path: self.path.clone(),
                source,
            });
        }
        removed?;
        debug!(path = %self.path.display(), "Released run lock");
        Ok(())
    }
}

impl Drop for FileRunLock {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), error = %e, "Cannot release run lock");
        }
    }
}

// ============================================================================
// Health cache
// ============================================================================

/// Last health report, kept on disk for the monitoring poller.
#[derive(Debug, Clone)]
pub struct HealthCache {
    path: PathBuf,
    max_age: Duration,
}

impl HealthCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_age: DEFAULT_MAX_CACHE_AGE,
        }
    }

    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the cached report.
    pub async fn write(&self, report: &HealthReport) -> CoordinatorResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(io_error(parent))?;
        }
        let json = serde_json::to_vec_pretty(report).map_err(|source| {
            CoordinatorError::CacheFormat {
                path: self.path.clone(),
                source,
            }
        })?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(io_error(&self.path))
    }

    /// The cached report, or UNKNOWN when there is none or it is too old.
    pub async fn read(&self) -> CoordinatorResult<HealthReport> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(HealthReport::unknown(format!(
                    "no health report in {}",
                    self.path.display()
                )))
            }
            Err(e) => return Err(io_error(&self.path)(e)),
        };
        let report: HealthReport =
            serde_json::from_slice(&bytes).map_err(|source| CoordinatorError::CacheFormat {
                path: self.path.clone(),
                source,
            })?;

        let age = Utc::now()
            .signed_duration_since(report.generated_at)
            .to_std()
            .unwrap_or_default();
        if age > self.max_age {
            let mut stale = HealthReport::unknown(format!(
                "health report is {}s old (max {}s), last status {}: {}",
                age.as_secs(),
                self.max_age.as_secs(),
                report.status,
                report.message
            ));
            stale.metrics = report.metrics;
            stale.run_id = report.run_id;
            return Ok(stale);
        }
        Ok(report)
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Runs a pass under the run lock and records its health.
pub struct RunCoordinator {
    lock: Box<dyn RunLock>,
    cache: HealthCache,
    thresholds: Thresholds,
}

impl RunCoordinator {
    pub fn new(lock: Box<dyn RunLock>, cache: HealthCache, thresholds: Thresholds) -> Self {
        Self {
            lock,
            cache,
            thresholds,
        }
    }

    /// Lock, run one pass, record health, unlock.
    ///
    /// Without the lock nothing else happens: no storage call, no watermark
    /// access, and the report is CRITICAL.
    pub async fn run(
        &mut self,
        engine: &ReconciliationEngine,
        ctx: &SyncContext,
        kinds: &[EntityKind],
    ) -> HealthReport {
        if let Err(e) = self.lock.try_acquire() {
            error!(run_id = %ctx.run_id(), error = %e, "Cannot acquire run lock");
            let mut report = HealthReport::critical(e.to_string());
            report.run_id = Some(ctx.run_id());
            self.record(&report).await;
            return report;
        }

        let summary = engine.run_pass(ctx, kinds).await;
        let report = HealthReport::from_summary(&summary, &self.thresholds);
        self.record(&report).await;

        if let Err(e) = self.lock.release() {
            error!(run_id = %ctx.run_id(), error = %e, "Cannot release run lock");
        }

        match report.status {
            HealthStatus::Ok => info!(run_id = %ctx.run_id(), message = %report.message, "Run healthy"),
            status => warn!(run_id = %ctx.run_id(), status = %status, message = %report.message, "Run degraded"),
        }
        report
    }

    async fn record(&self, report: &HealthReport) {
        if let Err(e) = self.cache.write(report).await {
            error!(path = %self.cache.path().display(), error = %e, "Cannot write health cache");
        }
    }
}
