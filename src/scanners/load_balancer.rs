use async_trait::async_trait;

use crate::config::KindConfig;
use crate::models::{
    Aggregate, Comparison, Finding, ResourceDescriptor, ResourceKind, Severity, Statistic, ThresholdRule,
};
use super::rules::severity_for;
use super::{FindingDraft, ScanContext, Scanner};

pub const NO_TARGETS_RULE: &str = "no_registered_targets";

/// Application and network load balancers.
pub struct LoadBalancerScanner;

fn registered_targets(resource: &ResourceDescriptor) -> Option<f64> {
    resource.attr_f64("registered_targets")
}

#[async_trait]
impl Scanner for LoadBalancerScanner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::LoadBalancer
    }

    fn service(&self) -> &'static str {
        "elb"
    }

    fn default_rules(&self, config: &KindConfig) -> Vec<ThresholdRule> {
        vec![ThresholdRule::new(
            "low_request_count",
            "RequestCount",
            Comparison::Below,
            config.threshold("request_threshold", 10.0),
        )
        .with_statistic(Statistic::Sum)
        .with_aggregate(Aggregate::DailySum)]
    }

    fn age_attribute(&self) -> &'static str {
        "created_time"
    }

    /// A balancer with nothing behind it is reported by state; its traffic
    /// is irrelevant.
    fn wants_metrics(&self, resource: &ResourceDescriptor) -> bool {
        registered_targets(resource).map_or(true, |n| n > 0.0)
    }

    fn state_findings(&self, ctx: &ScanContext, resource: &ResourceDescriptor, _config: &KindConfig) -> Vec<Finding> {
        if registered_targets(resource) != Some(0.0) {
            return Vec::new();
        }
        let draft = FindingDraft {
            rule_triggered: NO_TARGETS_RULE.to_string(),
            observed_value: None,
            severity: Severity::High,
            description: format!("Load balancer {} has no registered targets", resource.resource_id),
            recommendation: "Delete the load balancer if it no longer fronts any service".to_string(),
        };
        vec![ctx.finding(resource, draft, ctx.estimator.estimate_with_ratio(resource, 1.0))]
    }

    fn evaluate(
        &self,
        ctx: &ScanContext,
        resource: &ResourceDescriptor,
        rule: &ThresholdRule,
        observed: f64,
        window_days: u32,
    ) -> Finding {
        let draft = FindingDraft {
            rule_triggered: rule.id(),
            observed_value: Some(observed),
            severity: severity_for(rule, observed),
            description: format!(
                "Load balancer {} served {:.1} requests/day over {} days",
                resource.resource_id, observed, window_days
            ),
            recommendation: "Consolidate low-traffic listeners onto a shared load balancer".to_string(),
        };
        ctx.finding(resource, draft, ctx.estimator.estimate(resource, rule))
    }
}
