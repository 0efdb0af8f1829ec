use async_trait::async_trait;

use crate::config::KindConfig;
use crate::models::{Aggregate, Comparison, Finding, ResourceDescriptor, ResourceKind, Statistic, ThresholdRule};
use super::rules::severity_for;
use super::{FindingDraft, ScanContext, Scanner};

/// Serverless functions.
pub struct FunctionScanner;

#[async_trait]
impl Scanner for FunctionScanner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Function
    }

    fn service(&self) -> &'static str {
        "lambda"
    }

    fn default_rules(&self, config: &KindConfig) -> Vec<ThresholdRule> {
        vec![ThresholdRule::new(
            "low_invocations",
            "Invocations",
            Comparison::Below,
            config.threshold("invocation_threshold", 1.0),
        )
        .with_statistic(Statistic::Sum)
        .with_aggregate(Aggregate::DailySum)]
    }

    fn age_attribute(&self) -> &'static str {
        "last_modified"
    }

    fn evaluate(
        &self,
        ctx: &ScanContext,
        resource: &ResourceDescriptor,
        rule: &ThresholdRule,
        observed: f64,
        window_days: u32,
    ) -> Finding {
        let memory = resource.attr_display("memory_mb").unwrap_or_else(|| "?".to_string());
        let draft = FindingDraft {
            rule_triggered: rule.id(),
            observed_value: Some(observed),
            severity: severity_for(rule, observed),
            description: format!(
                "Function {} ({} MB) averaged {:.2} invocations/day over {} days",
                resource.resource_id, memory, observed, window_days
            ),
            recommendation: "Remove the function and its provisioned concurrency if it is no longer called"
                .to_string(),
        };
        ctx.finding(resource, draft, ctx.estimator.estimate(resource, rule))
    }
}
