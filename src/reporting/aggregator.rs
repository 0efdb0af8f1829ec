use std::cmp::Ordering;
use std::collections::HashSet;

use crate::models::{Finding, FindingSummary};

#[derive(Debug, Clone, Default)]
pub struct AggregatedFindings {
    pub findings: Vec<Finding>,
    pub summary: FindingSummary,
}

/// Collapses a cycle's merged findings into the reported set.
#[derive(Debug, Clone, Copy, Default)]
pub struct FindingAggregator;

impl FindingAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Deduplicate by `(resource_id, rule_triggered)` keeping the first
    /// occurrence in input order, sort, and total.
    pub fn aggregate(&self, findings: Vec<Finding>) -> AggregatedFindings {
        let mut findings = deduplicate_findings(findings);
        findings.sort_by(presentation_order);
        let summary = summarize(&findings);
        AggregatedFindings { findings, summary }
    }
}

pub fn deduplicate_findings(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    findings
        .into_iter()
        .filter(|f| {
            let (resource_id, rule) = f.dedup_key();
            seen.insert((resource_id.to_owned(), rule.to_owned()))
        })
        .collect()
}

/// Highest savings first; ties by resource id, then rule.
fn presentation_order(a: &Finding, b: &Finding) -> Ordering {
    b.estimated_monthly_savings
        .total_cmp(&a.estimated_monthly_savings)
        .then_with(|| a.resource.resource_id.cmp(&b.resource.resource_id))
        .then_with(|| a.rule_triggered.cmp(&b.rule_triggered))
}

fn summarize(findings: &[Finding]) -> FindingSummary {
    let mut summary = FindingSummary {
        total_findings: findings.len(),
        ..Default::default()
    };
    for finding in findings {
        summary.total_monthly_savings += finding.estimated_monthly_savings;
        if finding.estimate_unavailable {
            summary.estimates_unavailable += 1;
        }
        *summary
            .by_severity
            .entry(finding.severity.as_str().to_string())
            .or_insert(0) += 1;
        let kind = summary.by_kind.entry(finding.resource.kind.as_str().to_string()).or_default();
        kind.findings += 1;
        kind.monthly_savings += finding.estimated_monthly_savings;
    }
    summary.total_monthly_savings = (summary.total_monthly_savings * 100.0).round() / 100.0;
    summary
}
