use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resource::ResourceDescriptor;

/// Severity level for a finding, ordered from most to least severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    /// Returns a numeric rank where lower values indicate higher severity.
    /// Critical = 0, High = 1, Medium = 2, Low = 3, Info = 4.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 0,
            Severity::High => 1,
            Severity::Medium => 2,
            Severity::Low => 3,
            Severity::Info => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A threshold breach (or idle state) observed on a resource in this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub resource: ResourceDescriptor,
    /// Rule identifier, e.g. `low_cpu_utilization` or `unattached_volume`.
    pub rule_triggered: String,
    /// Aggregated metric value that breached the rule; `None` for state findings.
    pub observed_value: Option<f64>,
    pub estimated_monthly_savings: f64,
    /// Set when no rate-table entry matched, in which case savings are 0.
    pub estimate_unavailable: bool,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
    pub found_at: DateTime<Utc>,
}

impl Finding {
    /// Key under which duplicate findings collapse.
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.resource.resource_id.as_str(), self.rule_triggered.as_str())
    }
}
