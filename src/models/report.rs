use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindTotals {
    pub findings: usize,
    pub monthly_savings: f64,
}

/// Totals over the deduplicated finding set of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FindingSummary {
    pub total_findings: usize,
    pub total_monthly_savings: f64,
    pub estimates_unavailable: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_kind: BTreeMap<String, KindTotals>,
}
