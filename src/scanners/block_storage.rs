use async_trait::async_trait;

use crate::config::KindConfig;
use crate::models::{
    Aggregate, Comparison, Finding, ResourceDescriptor, ResourceKind, Severity, Statistic, ThresholdRule,
};
use super::{FindingDraft, ScanContext, Scanner};

pub const LOW_UTILIZATION_RULE: &str = "low_volume_utilization";
pub const UNATTACHED_RULE: &str = "unattached_volume";

/// Unattached for longer than this is high severity.
const STALE_UNATTACHED_DAYS: i64 = 30;

/// Block storage volumes.
pub struct BlockStorageScanner;

fn state(resource: &ResourceDescriptor) -> Option<&str> {
    resource.attr_str("state")
}

#[async_trait]
impl Scanner for BlockStorageScanner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::BlockStorage
    }

    fn service(&self) -> &'static str {
        "ec2"
    }

    /// Daily read plus write operations; a quiet volume might still be
    /// needed, so only half its cost counts as savings.
    fn default_rules(&self, config: &KindConfig) -> Vec<ThresholdRule> {
        vec![ThresholdRule::new(
            LOW_UTILIZATION_RULE,
            "VolumeReadOps+VolumeWriteOps",
            Comparison::Below,
            config.threshold("iops_threshold", 1.0),
        )
        .with_statistic(Statistic::Sum)
        .with_aggregate(Aggregate::DailySum)
        .with_savings_ratio(0.5)]
    }

    fn wants_metrics(&self, resource: &ResourceDescriptor) -> bool {
        matches!(state(resource), None | Some("in-use"))
    }

    fn state_findings(&self, ctx: &ScanContext, resource: &ResourceDescriptor, _config: &KindConfig) -> Vec<Finding> {
        if state(resource) != Some("available") {
            return Vec::new();
        }
        let days = resource.age_days("create_time", ctx.now).unwrap_or(0).max(0);
        let size = resource.attr_display("size_gb").unwrap_or_else(|| "?".to_string());
        let volume_type = resource.attr_str("volume_type").unwrap_or("unknown");
        let draft = FindingDraft {
            rule_triggered: UNATTACHED_RULE.to_string(),
            observed_value: None,
            severity: if days > STALE_UNATTACHED_DAYS { Severity::High } else { Severity::Medium },
            description: format!(
                "Volume {} ({}GB {}) is unattached, created {} days ago",
                resource.resource_id, size, volume_type, days
            ),
            recommendation: "Delete it if no longer needed, or attach it to an instance".to_string(),
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
            severity: if observed == 0.0 { Severity::Medium } else { Severity::Low },
            description: format!(
                "Volume {} averaged {:.1} operations/day over {} days",
                resource.resource_id, observed, window_days
            ),
            recommendation: "Review whether the volume is needed or move to a smaller size".to_string(),
        };
        ctx.finding(resource, draft, ctx.estimator.estimate(resource, rule))
    }
}
