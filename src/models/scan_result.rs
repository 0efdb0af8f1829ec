use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::Finding;
use super::report::FindingSummary;
use super::target::ScanTarget;
use crate::errors::IdlescanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanErrorKind {
    Throttled,
    Denied,
    Timeout,
    Unknown,
}

impl ScanErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Throttled => "throttled",
            Self::Denied => "denied",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

/// Failure of one scan target, captured without aborting the cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanError {
    pub target: ScanTarget,
    pub kind: ScanErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl ScanError {
    pub fn from_error(target: ScanTarget, err: &IdlescanError) -> Self {
        let class = err.classify();
        Self {
            target,
            kind: class.scan_kind,
            message: err.to_string(),
            // A throttled target is worth re-running even though its own
            // backoff budget is spent.
            retryable: class.retryable || class.scan_kind == ScanErrorKind::Throttled,
        }
    }

    pub fn timeout(target: ScanTarget, message: impl Into<String>) -> Self {
        Self {
            target,
            kind: ScanErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    Pending,
    Running,
    Completed,
    PartiallyFailed,
    Failed,
}

impl CycleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyFailed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CycleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The frozen outcome of one scan cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub cycle_id: Uuid,
    pub status: CycleStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration of the cycle in milliseconds.
    pub duration_ms: u64,
    pub targets_total: usize,
    pub targets_completed: usize,
    pub resources_scanned_count: usize,
    /// Resources skipped by tag or type exclusions before any metrics fetch.
    pub resources_excluded: usize,
    /// Rule evaluations skipped for insufficient sample coverage.
    pub rules_skipped: usize,
    /// Deduplicated findings, highest estimated savings first.
    pub findings: Vec<Finding>,
    /// One entry per failed target, in target submission order.
    pub errors: Vec<ScanError>,
    pub summary: FindingSummary,
}

impl ScanResult {
    pub fn duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.duration_ms)
    }

    pub fn total_findings(&self) -> usize {
        self.findings.len()
    }

    pub fn errors_of_kind(&self, kind: ScanErrorKind) -> impl Iterator<Item = &ScanError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }
}
