//! Health model for monitoring.
//!
//! A pass is condensed into one [`HealthReport`]: a status, a one-line
//! message and named counters per storage (`<storage>_users_sync`,
//! `<storage>_users_sync_fail`, `<storage>_quota_sync`, ...). The failure
//! counters carry warning and critical thresholds and decide the status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::engine::PassSummary;

/// Monitoring status, with Nagios exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl HealthStatus {
    /// Get the string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "OK",
            HealthStatus::Warning => "WARNING",
            HealthStatus::Critical => "CRITICAL",
            HealthStatus::Unknown => "UNKNOWN",
        }
    }

    /// Nagios plugin exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            HealthStatus::Ok => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Critical => 2,
            HealthStatus::Unknown => 3,
        }
    }

    fn severity(self) -> u8 {
        match self {
            HealthStatus::Ok => 0,
            HealthStatus::Warning => 1,
            HealthStatus::Unknown => 2,
            HealthStatus::Critical => 3,
        }
    }

    /// The more severe of two statuses.
    #[must_use]
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Warning and critical ceilings for one failure counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Threshold {
    pub warning: u64,
    pub critical: u64,
}

impl Threshold {
    #[must_use]
    pub const fn new(warning: u64, critical: u64) -> Self {
        Self { warning, critical }
    }

    /// Status of a failure count.
    #[must_use]
    pub fn evaluate(&self, value: u64) -> HealthStatus {
        if value >= self.critical {
            HealthStatus::Critical
        } else if value >= self.warning {
            HealthStatus::Warning
        } else {
            HealthStatus::Ok
        }
    }
}

/// Thresholds per metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_users_threshold")]
    pub users: Threshold,
    #[serde(default = "default_quota_threshold")]
    pub quota: Threshold,
    #[serde(default = "default_projects_threshold")]
    pub projects: Threshold,
}

fn default_users_threshold() -> Threshold {
    Threshold::new(1, 10)
}

fn default_quota_threshold() -> Threshold {
    Threshold::new(1, 5)
}

fn default_projects_threshold() -> Threshold {
    Threshold::new(1, 2)
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            users: default_users_threshold(),
            quota: default_quota_threshold(),
            projects: default_projects_threshold(),
        }
    }
}

impl Thresholds {
    /// Every family with its name, for validation.
    #[must_use]
    pub fn families(&self) -> [(&'static str, Threshold); 3] {
        [
            ("users", self.users),
            ("quota", self.quota),
            ("projects", self.projects),
        ]
    }
}

/// One named counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: usize) -> Self {
        Self {
            name: name.into(),
            value: u64::try_from(value).unwrap_or(u64::MAX),
            threshold: None,
        }
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = Some(threshold);
        self
    }

    /// Status of this counter against its threshold.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        self.threshold
            .map_or(HealthStatus::Ok, |t| t.evaluate(self.value))
    }

    /// `name=value;warn;crit` performance data.
    #[must_use]
    pub fn perfdata(&self) -> String {
        match self.threshold {
            Some(t) => format!("{}={};{};{}", self.name, self.value, t.warning, t.critical),
            None => format!("{}={}", self.name, self.value),
        }
    }
}

/// Aggregate health of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    pub generated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
}

impl HealthReport {
    pub fn new(status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            metrics: Vec::new(),
            generated_at: Utc::now(),
            run_id: None,
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Critical, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unknown, message)
    }

    /// Condense a pass into a report.
    #[must_use]
    pub fn from_summary(summary: &PassSummary, thresholds: &Thresholds) -> Self {
        let metrics = summary_metrics(summary, thresholds);

        let mut status = metrics
            .iter()
            .map(Metric::status)
            .fold(HealthStatus::Ok, HealthStatus::worst);
        let mut notes = Vec::new();

        if let Some(error) = &summary.fatal_error {
            status = HealthStatus::Critical;
            let phase = summary.failed_phase.unwrap_or(summary.phase);
            notes.push(format!("pass aborted during {phase}: {error}"));
        }

        let failing: Vec<String> = metrics
            .iter()
            .filter(|m| m.threshold.is_some() && m.value > 0)
            .map(|m| format!("{}={}", m.name, m.value))
            .collect();
        if !failing.is_empty() {
            notes.push(format!("failures: {}", failing.join(", ")));
        }

        if let Some(error) = &summary.watermark_error {
            status = status.worst(HealthStatus::Warning);
            notes.push(format!(
                "watermark not saved ({error}), the next run reprocesses the same changes"
            ));
        }

        let mut message = if notes.is_empty() {
            "synchronisation completed".to_string()
        } else {
            notes.join("; ")
        };
        if summary.dry_run {
            message.push_str(" (dry run)");
        }

        Self {
            status,
            message,
            metrics,
            generated_at: summary.completed_at.unwrap_or_else(Utc::now),
            run_id: Some(summary.run_id),
        }
    }

    /// `STATUS header message | perfdata...`
    #[must_use]
    pub fn nagios_line(&self, header: &str) -> String {
        let mut line = format!("{} {} {}", self.status, header, self.message);
        if !self.metrics.is_empty() {
            let perfdata: Vec<String> = self.metrics.iter().map(Metric::perfdata).collect();
            line.push_str(" | ");
            line.push_str(&perfdata.join(" "));
        }
        line
    }
}

fn summary_metrics(summary: &PassSummary, thresholds: &Thresholds) -> Vec<Metric> {
    let mut metrics = Vec::new();
    if let Some(users) = &summary.users {
        metrics.push(Metric::new(format!("{}_users_sync", users.storage), users.ok.len()));
        metrics.push(
            Metric::new(format!("{}_users_sync_fail", users.storage), users.failed.len())
                .with_threshold(thresholds.users),
        );
        for quota in &users.quota {
            metrics.push(Metric::new(format!("{}_quota_sync", quota.storage), quota.ok.len()));
            metrics.push(
                Metric::new(format!("{}_quota_sync_fail", quota.storage), quota.failed.len())
                    .with_threshold(thresholds.quota),
            );
        }
    }
    if let Some(projects) = &summary.projects {
        metrics.push(Metric::new(
            format!("{}_prj_sync", projects.storage),
            projects.ok.len(),
        ));
        metrics.push(
            Metric::new(
                format!("{}_prj_sync_fail", projects.storage),
                projects.failed.len(),
            )
            .with_threshold(thresholds.projects),
        );
    }
    metrics
}
