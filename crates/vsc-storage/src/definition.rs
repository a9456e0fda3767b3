//! Storage definitions and path templates.
//!
//! A storage definition describes one backend+filesystem pair as the account
//! page knows it (`VSC_HOME`, `VSC_DATA`, `VSC_SCRATCH_KYUKON`, ...). The
//! on-disk location of every user directory and project fileset is rendered
//! from the definition's templates, so it is a pure function of the
//! definition, the identifier and the institute.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use vsc_core::VscId;

use crate::error::{StorageError, StorageResult};
use crate::types::{BackendKind, PathKind};

const PLACEHOLDERS: &[&str] = &["{institute}", "{prefix}", "{id}"];

fn default_replication() -> u32 {
    1
}

fn default_grace_secs() -> u64 {
    7 * 24 * 3600
}

fn default_search_depth() -> u32 {
    4
}

/// Relative path template with `{institute}`, `{prefix}` and `{id}` placeholders.
///
/// `{prefix}` is the identifier without its last two characters, so
/// `{institute}/{prefix}/{id}` renders `vsc40001` as `gent/vsc400/vsc40001`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathTemplate(String);

impl PathTemplate {
    /// Validate a template.
    pub fn new(template: impl Into<String>) -> StorageResult<Self> {
        let template = template.into();
        if template.is_empty() {
            return Err(StorageError::invalid_template(template, "empty"));
        }
        if template.starts_with('/') {
            return Err(StorageError::invalid_template(
                template,
                "must be relative to the mount point",
            ));
        }
        if !template.contains("{id}") {
            return Err(StorageError::invalid_template(template, "missing {id}"));
        }
        let mut rest = template.clone();
        for placeholder in PLACEHOLDERS {
            rest = rest.replace(placeholder, "x");
        }
        if rest.contains('{') || rest.contains('}') {
            return Err(StorageError::invalid_template(
                template,
                "unknown placeholder",
            ));
        }
        if Path::new(&rest)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::invalid_template(
                template,
                "only plain path components are allowed",
            ));
        }
        Ok(Self(template))
    }

    /// The raw template.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the template for an identifier, relative to the mount point.
    pub fn render(&self, id: &VscId, institute: &str) -> StorageResult<PathBuf> {
        if self.0.contains("{institute}") && !is_plain_component(institute) {
            return Err(StorageError::invalid_template(
                self.0.clone(),
                format!("institute '{institute}' cannot be used in a path"),
            ));
        }
        let rendered = self
            .0
            .replace("{institute}", institute)
            .replace("{prefix}", id.group_prefix())
            .replace("{id}", id.as_str());
        Ok(PathBuf::from(rendered))
    }
}

fn is_plain_component(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl TryFrom<String> for PathTemplate {
    type Error = StorageError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PathTemplate> for String {
    fn from(template: PathTemplate) -> Self {
        template.0
    }
}

/// One storage as configured for this site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDefinition {
    /// Storage name as used by the account page quota records.
    pub name: String,
    /// Backend device name (`mmlsfileset <filesystem>`, `lfs` target).
    pub filesystem: String,
    /// Backend family.
    pub backend: BackendKind,
    /// Where the filesystem is mounted on this host.
    pub mount_point: PathBuf,
    /// Data replication factor; account page quota is multiplied by it.
    #[serde(default = "default_replication")]
    pub data_replication_factor: u32,
    /// Fallback user quota when the account page has none.
    #[serde(default)]
    pub default_user_quota_kib: Option<u64>,
    /// Fallback project quota when the account page has none.
    #[serde(default)]
    pub default_project_quota_kib: Option<u64>,
    /// Fileset grace period in seconds.
    #[serde(default = "default_grace_secs")]
    pub grace_period_secs: u64,
    /// Template for per-user directories.
    #[serde(default)]
    pub user_path: Option<PathTemplate>,
    /// Template for project filesets.
    #[serde(default)]
    pub project_path: Option<PathTemplate>,
    /// Added to the numeric suffix of a project name to form the Lustre project id.
    #[serde(default)]
    pub lustre_project_id_offset: u32,
    /// Depth below the mount point searched for existing Lustre projects.
    #[serde(default = "default_search_depth")]
    pub lustre_search_depth: u32,
}

impl StorageDefinition {
    /// A definition with defaults for everything but the identity of the storage.
    pub fn new(
        name: impl Into<String>,
        filesystem: impl Into<String>,
        backend: BackendKind,
        mount_point: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            filesystem: filesystem.into(),
            backend,
            mount_point: mount_point.into(),
            data_replication_factor: default_replication(),
            default_user_quota_kib: None,
            default_project_quota_kib: None,
            grace_period_secs: default_grace_secs(),
            user_path: None,
            project_path: None,
            lustre_project_id_offset: 0,
            lustre_search_depth: default_search_depth(),
        }
    }

    /// Set the user path template.
    #[must_use]
    pub fn with_user_path(mut self, template: PathTemplate) -> Self {
        self.user_path = Some(template);
        self
    }

    /// Set the project path template.
    #[must_use]
    pub fn with_project_path(mut self, template: PathTemplate) -> Self {
        self.project_path = Some(template);
        self
    }

    /// Set the replication factor.
    #[must_use]
    pub fn with_replication(mut self, factor: u32) -> Self {
        self.data_replication_factor = factor;
        self
    }

    /// Set the default project quota.
    #[must_use]
    pub fn with_default_project_quota(mut self, kib: u64) -> Self {
        self.default_project_quota_kib = Some(kib);
        self
    }

    /// The configured template for a kind.
    pub fn template(&self, kind: PathKind) -> StorageResult<&PathTemplate> {
        let template = match kind {
            PathKind::User => self.user_path.as_ref(),
            PathKind::Project => self.project_path.as_ref(),
        };
        template.ok_or_else(|| StorageError::MissingTemplate {
            storage: self.name.clone(),
            kind: kind.to_string(),
        })
    }

    /// Absolute path of an entity's directory on this storage.
    pub fn path_for(&self, kind: PathKind, id: &VscId, institute: &str) -> StorageResult<PathBuf> {
        let relative = self.template(kind)?.render(id, institute)?;
        Ok(self.mount_point.join(relative))
    }

    /// The fileset grace period.
    #[must_use]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    /// Reject definitions the adapters cannot work with.
    pub fn validate(&self) -> StorageResult<()> {
        if self.name.trim().is_empty() {
            return Err(StorageError::invalid_template(
                String::new(),
                "storage name is empty",
            ));
        }
        if !self.mount_point.is_absolute() {
            return Err(StorageError::invalid_template(
                self.mount_point.display().to_string(),
                format!("mount point of storage '{}' must be absolute", self.name),
            ));
        }
        if self.data_replication_factor == 0 {
            return Err(StorageError::invalid_template(
                self.name.clone(),
                "data_replication_factor must be at least 1",
            ));
        }
        Ok(())
    }
}
