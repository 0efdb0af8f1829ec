pub mod block_storage;
pub mod compute;
pub mod database;
pub mod function;
pub mod load_balancer;
pub mod registry;
pub mod rules;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cloud::ClientPool;
use crate::config::KindConfig;
use crate::cost::{CostEstimate, CostEstimator};
use crate::errors::{with_backoff, BackoffPolicy, IdlescanError};
use crate::metrics::{MetricQuery, MetricsGateway};
use crate::models::{
    Finding, MetricSample, MetricWindow, ResourceDescriptor, ResourceKind, ScanTarget, Severity, Statistic,
    ThresholdRule,
};
use crate::session::SessionProvider;
use self::rules::{evaluate_rule, merge_series, metric_components, severity_for, RuleOutcome};

pub use registry::ScannerRegistry;

/// Shared collaborators for every target in one cycle.
pub struct ScanContext {
    pub sessions: Arc<SessionProvider>,
    pub pool: Arc<ClientPool>,
    pub metrics: Arc<MetricsGateway>,
    pub estimator: Arc<CostEstimator>,
    pub policy: BackoffPolicy,
    pub metric_period_secs: u32,
    /// Cycle start; every lookback window ends here.
    pub now: DateTime<Utc>,
    pub cancel: CancellationToken,
}

/// Text and severity for a finding, before the cost estimate is attached.
pub struct FindingDraft {
    pub rule_triggered: String,
    pub observed_value: Option<f64>,
    pub severity: Severity,
    pub description: String,
    pub recommendation: String,
}

impl ScanContext {
    pub fn finding(&self, resource: &ResourceDescriptor, draft: FindingDraft, estimate: CostEstimate) -> Finding {
        Finding {
            resource: resource.clone(),
            rule_triggered: draft.rule_triggered,
            observed_value: draft.observed_value,
            estimated_monthly_savings: estimate.monthly_savings,
            estimate_unavailable: estimate.unavailable,
            severity: draft.severity,
            description: draft.description,
            recommendation: draft.recommendation,
            found_at: self.now,
        }
    }

    /// All resources of `kind` in the target, following pagination.
    pub async fn list_all(
        &self,
        service: &str,
        target: &ScanTarget,
    ) -> Result<Vec<ResourceDescriptor>, IdlescanError> {
        let handle = self.sessions.resolve(&target.account_id, &target.region, &self.cancel).await?;
        let client = self.pool.get(&handle, service, &self.cancel).await?;

        let mut resources = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let page = with_backoff("list_resources", &self.policy, &self.cancel, || {
                client.list_resources(&handle, target.resource_kind, token.as_deref())
            })
            .await?;
            resources.extend(page.resources);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(resources)
    }
}

/// One implementation per resource kind, registered in a [`ScannerRegistry`].
#[async_trait]
pub trait Scanner: Send + Sync {
    fn kind(&self) -> ResourceKind;

    /// Remote service that lists this kind.
    fn service(&self) -> &'static str;

    /// Rules used when the configuration supplies none, built from the kind's
    /// shorthand thresholds.
    fn default_rules(&self, config: &KindConfig) -> Vec<ThresholdRule>;

    /// Attribute holding the creation time, used for `minimum_age_days`.
    fn age_attribute(&self) -> &'static str {
        "create_time"
    }

    async fn list(&self, ctx: &ScanContext, target: &ScanTarget) -> Result<Vec<ResourceDescriptor>, IdlescanError> {
        ctx.list_all(self.service(), target).await
    }

    /// Why `resource` is skipped before any metrics are fetched, if it is.
    fn exclusion_reason(
        &self,
        resource: &ResourceDescriptor,
        config: &KindConfig,
        now: DateTime<Utc>,
    ) -> Option<String> {
        if config.is_tag_excluded(&resource.tags) {
            return Some("excluded by tag".to_string());
        }
        if let Some(resource_type) = resource.attr_display(self.kind().size_attribute()) {
            if config.is_type_excluded(&resource_type) {
                return Some(format!("type {} excluded", resource_type));
            }
        }
        if let Some(min_age) = config.minimum_age_days {
            if let Some(age) = resource.age_days(self.age_attribute(), now) {
                if age < i64::from(min_age) {
                    return Some(format!("only {} days old", age));
                }
            }
        }
        None
    }

    fn wants_metrics(&self, _resource: &ResourceDescriptor) -> bool {
        true
    }

    /// Findings derived from the resource's state alone.
    fn state_findings(&self, _ctx: &ScanContext, _resource: &ResourceDescriptor, _config: &KindConfig) -> Vec<Finding> {
        Vec::new()
    }

    /// Build the finding for a rule that `run_target` already found breached.
    ///
    /// Sample fetching, the coverage check and the comparison all happen in
    /// `run_target` through `rules::evaluate_rule`, so a rule without enough data
    /// never reaches this method. Scanners override it only to change wording,
    /// severity or the savings estimate.
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
                "{} {} {} is {} {} ({:.2} over {} days)",
                resource.kind,
                resource.resource_id,
                rule.metric_name,
                rule.comparison.as_str(),
                rule.limit,
                observed,
                window_days
            ),
            recommendation: "Review whether this resource is still needed".to_string(),
        };
        ctx.finding(resource, draft, ctx.estimator.estimate(resource, rule))
    }
}

#[derive(Debug, Default)]
pub struct TargetReport {
    pub findings: Vec<Finding>,
    pub resources_scanned: usize,
    pub resources_excluded: usize,
    pub rules_skipped: usize,
}

/// Scan one target: list, exclude, then evaluate state and every rule for
/// each remaining resource. Findings come back ordered by resource id.
///
/// A metrics `NotFound` (the resource vanished between listing and fetch)
/// counts as no data. Any other error fails the whole target.
pub async fn run_target(
    scanner: &dyn Scanner,
    ctx: &ScanContext,
    target: &ScanTarget,
    config: &KindConfig,
) -> Result<TargetReport, IdlescanError> {
    let resources = scanner.list(ctx, target).await?;
    let rules = if config.rules.is_empty() {
        scanner.default_rules(config)
    } else {
        config.rules.clone()
    };

    let mut report = TargetReport::default();
    for resource in &resources {
        if let Some(reason) = scanner.exclusion_reason(resource, config, ctx.now) {
            debug!(resource = %resource.resource_id, reason = %reason, "Resource excluded");
            report.resources_excluded += 1;
            continue;
        }
        report.resources_scanned += 1;
        report.findings.extend(scanner.state_findings(ctx, resource, config));

        if !scanner.wants_metrics(resource) {
            continue;
        }

        let mut fetched: HashMap<(String, Statistic, u32), Vec<MetricSample>> = HashMap::new();
        for rule in &rules {
            let days = rule.window_days(config.days_to_check);
            let window = MetricWindow::trailing_days(ctx.now, days, ctx.metric_period_secs);
            let key = (rule.metric_name.clone(), rule.statistic, days);
            if !fetched.contains_key(&key) {
                let samples = fetch_rule_samples(ctx, resource, rule, &window).await?;
                fetched.insert(key.clone(), samples);
            }
            let samples = fetched.get(&key).map(Vec::as_slice).unwrap_or_default();

            match evaluate_rule(rule, samples, &window) {
                RuleOutcome::Breached { observed } => {
                    report.findings.push(scanner.evaluate(ctx, resource, rule, observed, days));
                }
                RuleOutcome::Clear { .. } => {}
                RuleOutcome::InsufficientData { coverage } => {
                    if samples.is_empty() {
                        debug!(resource = %resource.resource_id, rule = %rule.id(), "No datapoints in window");
                    } else {
                        debug!(
                            resource = %resource.resource_id,
                            rule = %rule.id(),
                            coverage,
                            required = rule.required_sample_coverage,
                            "Insufficient sample coverage, rule skipped"
                        );
                    }
                    report.rules_skipped += 1;
                }
            }
        }
    }

    report.findings.sort_by(|a, b| {
        a.resource
            .resource_id
            .cmp(&b.resource.resource_id)
            .then_with(|| a.rule_triggered.cmp(&b.rule_triggered))
    });
    info!(
        target = %target,
        listed = resources.len(),
        scanned = report.resources_scanned,
        findings = report.findings.len(),
        "Target scanned"
    );
    Ok(report)
}

async fn fetch_rule_samples(
    ctx: &ScanContext,
    resource: &ResourceDescriptor,
    rule: &ThresholdRule,
    window: &MetricWindow,
) -> Result<Vec<MetricSample>, IdlescanError> {
    let mut series = Vec::new();
    for metric in metric_components(&rule.metric_name) {
        let query = MetricQuery::new(metric, rule.statistic);
        match ctx.metrics.fetch(resource, &query, window, &ctx.cancel).await {
            Ok(samples) => series.push(samples),
            Err(IdlescanError::NotFound(msg)) => {
                debug!(resource = %resource.resource_id, metric, error = %msg, "Resource gone, treating as no data");
                series.push(Vec::new());
            }
            Err(e) => return Err(e),
        }
    }
    Ok(merge_series(series, &rule.metric_name))
}
