use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::models::{Comparison, MetricSample, MetricWindow, Severity, ThresholdRule};

/// Result of checking one rule against one resource's samples.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Breached { observed: f64 },
    Clear { observed: f64 },
    /// Coverage below the rule's requirement, including no samples at all.
    InsufficientData { coverage: f64 },
}

pub fn evaluate_rule(rule: &ThresholdRule, samples: &[MetricSample], window: &MetricWindow) -> RuleOutcome {
    let coverage = window.coverage(samples);
    if samples.is_empty() || coverage < rule.required_sample_coverage {
        return RuleOutcome::InsufficientData { coverage };
    }
    match rule.aggregate.apply(samples, window) {
        Some(observed) if rule.comparison.breached(observed, rule.limit) => RuleOutcome::Breached { observed },
        Some(observed) => RuleOutcome::Clear { observed },
        None => RuleOutcome::InsufficientData { coverage },
    }
}

/// A `below` breach far under its limit (under a fifth of it) is high
/// severity; anything else is medium.
pub fn severity_for(rule: &ThresholdRule, observed: f64) -> Severity {
    match rule.comparison {
        Comparison::Below if observed < rule.limit * 0.2 => Severity::High,
        _ => Severity::Medium,
    }
}

/// Component metrics of a rule. `VolumeReadOps+VolumeWriteOps` names the sum
/// of two series.
pub fn metric_components(metric_name: &str) -> Vec<&str> {
    metric_name
        .split('+')
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .collect()
}

/// Sum several ascending series point-wise by timestamp.
pub fn merge_series(series: Vec<Vec<MetricSample>>, metric_name: &str) -> Vec<MetricSample> {
    if series.len() == 1 {
        return series.into_iter().next().unwrap_or_default();
    }
    let mut totals: BTreeMap<DateTime<Utc>, f64> = BTreeMap::new();
    for sample in series.into_iter().flatten() {
        *totals.entry(sample.timestamp).or_insert(0.0) += sample.value;
    }
    totals
        .into_iter()
        .map(|(timestamp, value)| MetricSample {
            timestamp,
            metric_name: metric_name.to_string(),
            value,
        })
        .collect()
}
