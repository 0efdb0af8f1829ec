use tracing::debug;

use crate::config::RateUnit;
use crate::models::{ResourceDescriptor, ThresholdRule};
use super::rate_table::RateTable;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub monthly_savings: f64,
    /// No rate matched the resource, so `monthly_savings` is 0.
    pub unavailable: bool,
}

impl CostEstimate {
    pub fn unavailable() -> Self {
        Self { monthly_savings: 0.0, unavailable: true }
    }
}

/// Attaches a monthly savings estimate to a resource from the configured
/// rate table. Never fails: a missing rate degrades to an unavailable
/// estimate.
#[derive(Debug, Clone, Default)]
pub struct CostEstimator {
    rates: RateTable,
}

impl CostEstimator {
    pub fn new(rates: RateTable) -> Self {
        Self { rates }
    }

    pub fn estimate(&self, resource: &ResourceDescriptor, rule: &ThresholdRule) -> CostEstimate {
        self.estimate_with_ratio(resource, rule.savings_ratio)
    }

    /// Monthly cost of `resource` scaled by the share recovered by acting on
    /// a finding.
    pub fn estimate_with_ratio(&self, resource: &ResourceDescriptor, ratio: f64) -> CostEstimate {
        match self.monthly_cost(resource) {
            Some(cost) => CostEstimate {
                monthly_savings: round_cents(cost * ratio.clamp(0.0, 1.0)),
                unavailable: false,
            },
            None => {
                debug!(
                    resource = %resource.resource_id,
                    kind = %resource.kind,
                    region = %resource.region,
                    "No rate entry, estimate unavailable"
                );
                CostEstimate::unavailable()
            }
        }
    }

    pub fn monthly_cost(&self, resource: &ResourceDescriptor) -> Option<f64> {
        let size = resource.attr_display(resource.kind.size_attribute())?;
        let rate = self.rates.lookup(&resource.region, resource.kind, &size)?;
        match rate.unit {
            RateUnit::Resource => Some(rate.monthly_cost),
            RateUnit::Gb => resource.attr_f64("size_gb").map(|gb| rate.monthly_cost * gb),
        }
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateEntry;
    use crate::models::{Comparison, ResourceKind};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn resource(kind: ResourceKind, attrs: &[(&str, serde_json::Value)]) -> ResourceDescriptor {
        ResourceDescriptor {
            resource_id: "r-1".into(),
            kind,
            region: "us-east-1".into(),
            account_id: "111111111111".into(),
            tags: BTreeMap::new(),
            attributes: attrs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        }
    }

    fn estimator() -> CostEstimator {
        CostEstimator::new(RateTable::from_entries(&[
            RateEntry {
                region: "us-east-1".into(),
                kind: ResourceKind::Compute,
                size: "m5.large".into(),
                monthly_cost: 70.08,
                unit: RateUnit::Resource,
            },
            RateEntry {
                region: "*".into(),
                kind: ResourceKind::BlockStorage,
                size: "gp3".into(),
                monthly_cost: 0.08,
                unit: RateUnit::Gb,
            },
        ]))
    }

    fn cpu_rule() -> ThresholdRule {
        ThresholdRule::new("low_cpu_utilization", "CPUUtilization", Comparison::Below, 5.0)
    }

    #[test]
    fn test_per_resource_rate() {
        let r = resource(ResourceKind::Compute, &[("instance_type", json!("m5.large"))]);
        let estimate = estimator().estimate(&r, &cpu_rule());
        assert_eq!(estimate, CostEstimate { monthly_savings: 70.08, unavailable: false });
    }

    #[test]
    fn test_per_gb_rate_with_partial_ratio() {
        let r = resource(
            ResourceKind::BlockStorage,
            &[("volume_type", json!("gp3")), ("size_gb", json!(500))],
        );
        let estimate = estimator().estimate_with_ratio(&r, 0.5);
        assert_eq!(estimate.monthly_savings, 20.0);
        assert!(!estimate.unavailable);
    }

    #[test]
    fn test_missing_rate_degrades_to_zero() {
        let r = resource(ResourceKind::Compute, &[("instance_type", json!("x2iedn.32xlarge"))]);
        let estimate = estimator().estimate(&r, &cpu_rule());
        assert_eq!(estimate.monthly_savings, 0.0);
        assert!(estimate.unavailable);
    }

    #[test]
    fn test_missing_size_attribute_is_unavailable() {
        let r = resource(ResourceKind::Compute, &[]);
        assert!(estimator().estimate(&r, &cpu_rule()).unavailable);
        let gb_without_size = resource(ResourceKind::BlockStorage, &[("volume_type", json!("gp3"))]);
        assert!(estimator().estimate_with_ratio(&gb_without_size, 1.0).unavailable);
    }
}
