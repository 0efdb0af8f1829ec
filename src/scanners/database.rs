use async_trait::async_trait;

use crate::config::KindConfig;
use crate::errors::IdlescanError;
use crate::models::{Comparison, Finding, ResourceDescriptor, ResourceKind, ScanTarget, ThresholdRule};
use super::rules::severity_for;
use super::{FindingDraft, ScanContext, Scanner};

/// Managed relational database instances.
pub struct DatabaseScanner;

#[async_trait]
impl Scanner for DatabaseScanner {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Database
    }

    fn service(&self) -> &'static str {
        "rds"
    }

    fn default_rules(&self, config: &KindConfig) -> Vec<ThresholdRule> {
        vec![
            ThresholdRule::new(
                "low_cpu_utilization",
                "CPUUtilization",
                Comparison::Below,
                config.threshold("cpu_threshold", 10.0),
            ),
            ThresholdRule::new(
                "low_connection_count",
                "DatabaseConnections",
                Comparison::Below,
                config.threshold("connection_threshold", 5.0),
            ),
        ]
    }

    /// Only `available` instances are evaluated; databases that are
    /// creating, modifying or stopped have no meaningful utilization.
    async fn list(&self, ctx: &ScanContext, target: &ScanTarget) -> Result<Vec<ResourceDescriptor>, IdlescanError> {
        let mut databases = ctx.list_all(self.service(), target).await?;
        databases.retain(|db| db.attr_str("status").map_or(true, |s| s == "available"));
        Ok(databases)
    }

    fn evaluate(
        &self,
        ctx: &ScanContext,
        resource: &ResourceDescriptor,
        rule: &ThresholdRule,
        observed: f64,
        window_days: u32,
    ) -> Finding {
        let db_class = resource.attr_str("db_class").unwrap_or("unknown class");
        let (description, recommendation) = match rule.metric_name.as_str() {
            "CPUUtilization" => (
                format!(
                    "Database {} ({}) averaged {:.1}% CPU over {} days",
                    resource.resource_id, db_class, observed, window_days
                ),
                "Downsize to a smaller instance class or review whether the database is needed",
            ),
            "DatabaseConnections" => (
                format!(
                    "Database {} ({}) averaged {:.1} connections over {} days",
                    resource.resource_id, db_class, observed, window_days
                ),
                "Review whether the database is in use or consolidate it with another",
            ),
            other => (
                format!(
                    "Database {} ({}) {} {} {} over {} days: {:.2}",
                    resource.resource_id,
                    db_class,
                    other,
                    rule.comparison.as_str(),
                    rule.limit,
                    window_days,
                    observed
                ),
                "Review whether this database is still needed",
            ),
        };
        let draft = FindingDraft {
            rule_triggered: rule.id(),
            observed_value: Some(observed),
            severity: severity_for(rule, observed),
            description,
            recommendation: recommendation.to_string(),
        };
        ctx.finding(resource, draft, ctx.estimator.estimate(resource, rule))
    }
}
