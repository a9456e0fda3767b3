//! Runtime configuration.
//!
//! One YAML file describes the account page, the storages, which kinds are
//! provisioned where, and where run state lives:
//!
//! ```yaml
//! accountpage:
//!   base_url: https://account.vscentrum.be/django
//!   token_file: /etc/vsc-sync/token
//!   institute: gent
//! storages:
//!   - name: VSC_HOME
//!     filesystem: home
//!     backend: gpfs
//!     mount_point: /user/home
//!     user_path: '{institute}/{prefix}/{id}'
//! users:
//!   home_storage: VSC_HOME
//! quota:
//!   soft_fraction: 0.95
//! ```
//!
//! Every section except `accountpage` has defaults. The file path comes from
//! `--config`, else `VSC_SYNC_CONFIG`, else [`DEFAULT_CONFIG_PATH`].

use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use vsc_core::{EntityKind, Fraction, QuotaPolicy};
use vsc_provisioning::{EngineConfig, HealthCache, ProjectSettings, Thresholds, UserSettings};
use vsc_storage::StorageDefinition;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/vsc-sync/config.yaml";

/// Environment variable consulted when the configuration carries no token.
pub const TOKEN_ENV_VAR: &str = "VSC_ACCOUNTPAGE_TOKEN";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid {field}: {message}")]
    Invalid { field: String, message: String },
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// ============================================================================
// Sections
// ============================================================================

/// Complete configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    pub accountpage: AccountPageConfig,

    #[serde(default)]
    pub storages: Vec<StorageDefinition>,

    #[serde(default)]
    pub users: Option<UserSettings>,

    #[serde(default)]
    pub projects: Option<ProjectSettings>,

    #[serde(default)]
    pub quota: QuotaConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub thresholds: Thresholds,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Account page connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountPageConfig {
    pub base_url: String,

    /// Bearer token. Prefer `token_file` or the environment.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub token_file: Option<PathBuf>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Institute used by `users` and `projects` when they name none.
    #[serde(default)]
    pub institute: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl AccountPageConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// The token from the file, the inline value or the environment, in
    /// that order. `None` means anonymous access.
    pub fn resolve_token(&self) -> ConfigResult<Option<String>> {
        if let Some(path) = &self.token_file {
            let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            let token = raw.trim();
            if token.is_empty() {
                return Err(ConfigError::invalid(
                    "accountpage.token_file",
                    format!("{} is empty", path.display()),
                ));
            }
            return Ok(Some(token.to_string()));
        }
        if let Some(token) = &self.token {
            return Ok(Some(token.clone()));
        }
        Ok(std::env::var(TOKEN_ENV_VAR)
            .ok()
            .filter(|token| !token.trim().is_empty()))
    }
}

/// Quota policy knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaConfig {
    /// Soft limit as a fraction of the hard limit.
    #[serde(default = "default_soft_fraction")]
    pub soft_fraction: f64,

    /// Share of a project quota granted to each member.
    #[serde(default = "default_member_share")]
    pub member_share: f64,

    /// Fileset grace period in seconds, overriding every storage's own.
    #[serde(default)]
    pub grace_period_secs: Option<u64>,
}

fn default_soft_fraction() -> f64 {
    0.95
}

fn default_member_share() -> f64 {
    vsc_provisioning::context::DEFAULT_MEMBER_SHARE
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            soft_fraction: default_soft_fraction(),
            member_share: default_member_share(),
            grace_period_secs: None,
        }
    }
}

impl QuotaConfig {
    pub fn policy(&self) -> ConfigResult<QuotaPolicy> {
        QuotaPolicy::new(self.soft_fraction)
            .map_err(|e| ConfigError::invalid("quota.soft_fraction", e.to_string()))
    }

    pub fn member_share(&self) -> ConfigResult<Fraction> {
        Fraction::new(self.member_share)
            .map_err(|e| ConfigError::invalid("quota.member_share", e.to_string()))
    }
}

/// Where run state lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    #[serde(default = "default_watermark_file")]
    pub watermark_file: PathBuf,

    #[serde(default = "default_health_cache")]
    pub health_cache: PathBuf,

    /// Age after which `--nagios` reports the cached result as UNKNOWN.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_lock_file() -> PathBuf {
    PathBuf::from("/var/run/vsc-sync.lock")
}

fn default_watermark_file() -> PathBuf {
    PathBuf::from("/var/cache/vsc-sync/watermark")
}

fn default_health_cache() -> PathBuf {
    PathBuf::from("/var/cache/vsc-sync/health.json")
}

fn default_max_age_secs() -> u64 {
    900
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            lock_file: default_lock_file(),
            watermark_file: default_watermark_file(),
            health_cache: default_health_cache(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl PathsConfig {
    pub fn health_cache(&self) -> HealthCache {
        HealthCache::new(&self.health_cache).with_max_age(Duration::from_secs(self.max_age_secs))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Logging section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,

    /// Append to this file instead of writing to stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            file: None,
        }
    }
}

// ============================================================================
// Loading and validation
// ============================================================================

impl SyncConfig {
    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations a pass could not run with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.accountpage.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("accountpage.base_url", "must not be empty"));
        }
        self.quota.policy()?;
        self.quota.member_share()?;

        for (family, threshold) in self.thresholds.families() {
            if threshold.warning > threshold.critical {
                return Err(ConfigError::invalid(
                    format!("thresholds.{family}"),
                    format!(
                        "warning {} is above critical {}",
                        threshold.warning, threshold.critical
                    ),
                ));
            }
        }

        let mut names = BTreeSet::new();
        for definition in &self.storages {
            definition.validate().map_err(|e| {
                ConfigError::invalid(format!("storages.{}", definition.name), e.to_string())
            })?;
            if !names.insert(definition.name.as_str()) {
                return Err(ConfigError::invalid(
                    "storages",
                    format!("{} is defined twice", definition.name),
                ));
            }
        }

        if let Some(users) = &self.users {
            for storage in users.referenced_storages() {
                if !names.contains(storage) {
                    return Err(ConfigError::invalid(
                        "users",
                        format!("unknown storage {storage}"),
                    ));
                }
            }
        }

        if let Some(projects) = &self.projects {
            if projects.prefix.trim().is_empty() {
                return Err(ConfigError::invalid("projects.prefix", "must not be empty"));
            }
            if !names.contains(projects.storage.as_str()) {
                return Err(ConfigError::invalid(
                    "projects",
                    format!("unknown storage {}", projects.storage),
                ));
            }
        }

        Ok(())
    }

    /// Storage definitions with the global grace period applied.
    pub fn storage_definitions(&self) -> Vec<StorageDefinition> {
        let mut definitions = self.storages.clone();
        if let Some(grace) = self.quota.grace_period_secs {
            for definition in &mut definitions {
                definition.grace_period_secs = grace;
            }
        }
        definitions
    }

    /// Engine settings, with the account page institute as fallback.
    pub fn engine_config(&self) -> EngineConfig {
        let institute = self.accountpage.institute.clone();
        let users = self.users.clone().map(|mut users| {
            if users.institute.is_none() {
                users.institute.clone_from(&institute);
            }
            users
        });
        let projects = self.projects.clone().map(|mut projects| {
            if projects.institute.is_none() {
                projects.institute.clone_from(&institute);
            }
            projects
        });
        EngineConfig { users, projects }
    }

    /// Kinds run when no kind is requested: every configured section.
    pub fn configured_kinds(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        if self.users.is_some() {
            kinds.push(EntityKind::User);
        }
        if self.projects.is_some() {
            kinds.push(EntityKind::Project);
        }
        kinds
    }
}
