use crate::models::{Finding, ScanResult, Severity};
use crate::utils::formatting::{format_duration, format_monthly};

const SEVERITIES: [Severity; 5] = [
    Severity::Critical,
    Severity::High,
    Severity::Medium,
    Severity::Low,
    Severity::Info,
];

pub fn format_finding_line(finding: &Finding) -> String {
    let savings = if finding.estimate_unavailable {
        "estimate unavailable".to_string()
    } else {
        format_monthly(finding.estimated_monthly_savings)
    };
    format!(
        "[{:<6}] {:<14} {:<24} {:<22} {}",
        finding.severity.as_str().to_uppercase(),
        finding.resource.kind,
        finding.resource.resource_id,
        finding.rule_triggered,
        savings,
    )
}

pub fn format_scan_summary(result: &ScanResult) -> String {
    let summary = &result.summary;
    let mut out = format!(
        "Scan {} {} in {}\n\
         Targets: {}/{} completed, {} failed\n\
         Resources: {} scanned, {} excluded, {} rule evaluations skipped\n\
         Findings: {} (potential savings {})\n",
        result.cycle_id,
        result.status,
        format_duration(result.duration_ms),
        result.targets_completed,
        result.targets_total,
        result.errors.len(),
        result.resources_scanned_count,
        result.resources_excluded,
        result.rules_skipped,
        summary.total_findings,
        format_monthly(summary.total_monthly_savings),
    );

    let counts: Vec<String> = SEVERITIES
        .iter()
        .filter_map(|s| summary.by_severity.get(s.as_str()).map(|n| format!("{} {}", n, s)))
        .collect();
    if !counts.is_empty() {
        out.push_str(&format!("Severity: {}\n", counts.join(", ")));
    }
    if summary.estimates_unavailable > 0 {
        out.push_str(&format!(
            "{} finding(s) have no rate-table entry\n",
            summary.estimates_unavailable
        ));
    }
    for error in &result.errors {
        out.push_str(&format!("  ! {} [{}] {}\n", error.target, error.kind.as_str(), error.message));
    }
    out
}
