//! Persistence of the synchronisation watermark.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use vsc_core::{CoreError, Watermark};

/// Errors reading or writing the watermark.
#[derive(Debug, Error)]
pub enum WatermarkError {
    #[error("watermark I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt watermark in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CoreError,
    },
}

pub type WatermarkResult<T> = Result<T, WatermarkError>;

/// Durable storage for the watermark.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// The stored watermark, `None` if none was ever written.
    async fn load(&self) -> WatermarkResult<Option<Watermark>>;

    /// Replace the stored watermark.
    async fn store(&self, watermark: &Watermark) -> WatermarkResult<()>;
}

/// Watermark kept in a single-line text file.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a crash never leaves a truncated watermark behind.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: io::Error) -> WatermarkError {
        WatermarkError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn load(&self) -> WatermarkResult<Option<Watermark>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        let watermark = Watermark::parse(&contents).map_err(|source| WatermarkError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), watermark = %watermark, "Loaded watermark");
        Ok(Some(watermark))
    }

    async fn store(&self, watermark: &Watermark) -> WatermarkResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        let mut staging = self.path.clone().into_os_string();
        staging.push(".new");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, format!("{watermark}\n"))
            .await
            .map_err(|e| self.io_error(e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), watermark = %watermark, "Stored watermark");
        Ok(())
    }
}
