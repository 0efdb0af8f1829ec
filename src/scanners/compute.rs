use async_trait::async_trait;

use crate::config::KindConfig;
use crate::errors::IdlescanError;
use crate::models::{
    Comparison, Finding, ResourceDescriptor, ResourceKind, ScanTarget, Severity, ThresholdRule,
};
use super::rules::severity_for;
use super::{FindingDraft, ScanContext, Scanner};

pub const LOW_CPU_RULE: &str = "low_cpu_utilization";
pub const STOPPED_RULE: &str = "stopped_instance";

/// Virtual machine instances.
pub struct ComputeScanner;

fn state(resource: &ResourceDescriptor) -> Option<&str> {
    resource.attr_str("state")
}

#[async_trait]
impl Scanner for ComputeScanner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Compute
    }

    fn service(&self) -> &'static str {
        "ec2"
    }

    fn default_rules(&self, config: &KindConfig) -> Vec<ThresholdRule> {
        vec![ThresholdRule::new(
            LOW_CPU_RULE,
            "CPUUtilization",
            Comparison::Below,
            config.threshold("cpu_threshold", 5.0),
        )]
    }

    fn age_attribute(&self) -> &'static str {
        "launch_time"
    }

    async fn list(&self, ctx: &ScanContext, target: &ScanTarget) -> Result<Vec<ResourceDescriptor>, IdlescanError> {
        let mut instances = ctx.list_all(self.service(), target).await?;
        instances.retain(|i| !matches!(state(i), Some("terminated") | Some("shutting-down")));
        Ok(instances)
    }

    fn wants_metrics(&self, resource: &ResourceDescriptor) -> bool {
        matches!(state(resource), None | Some("running"))
    }

    fn state_findings(&self, ctx: &ScanContext, resource: &ResourceDescriptor, _config: &KindConfig) -> Vec<Finding> {
        if state(resource) != Some("stopped") {
            return Vec::new();
        }
        let instance_type = resource.attr_str("instance_type").unwrap_or("unknown type");
        let draft = FindingDraft {
            rule_triggered: STOPPED_RULE.to_string(),
            observed_value: None,
            severity: Severity::Medium,
            description: format!("Instance {} ({}) is stopped", resource.resource_id, instance_type),
            recommendation: "Terminate it if no longer needed; attached volumes still accrue charges".to_string(),
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
        let instance_type = resource.attr_str("instance_type").unwrap_or("unknown type");
        let (description, recommendation) = if rule.metric_name == "CPUUtilization" {
            (
                format!(
                    "Instance {} ({}) averaged {:.1}% CPU over {} days",
                    resource.resource_id, instance_type, observed, window_days
                ),
                "Downsize to a smaller instance type, or terminate if unused".to_string(),
            )
        } else {
            (
                format!(
                    "Instance {} ({}) {} {} {} over {} days: {:.2}",
                    resource.resource_id,
                    instance_type,
                    rule.metric_name,
                    rule.comparison.as_str(),
                    rule.limit,
                    window_days,
                    observed
                ),
                "Review whether this instance is still needed".to_string(),
            )
        };
        let draft = FindingDraft {
            rule_triggered: rule.id(),
            observed_value: Some(observed),
            severity: severity_for(rule, observed),
            description,
            recommendation,
        };
        ctx.finding(resource, draft, ctx.estimator.estimate(resource, rule))
    }
}
