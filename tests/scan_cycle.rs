use std::collections::BTreeSet;

use idlescan::cloud::{EmulatedCloud, Fault, FaultEffect, Fixture, FixtureResource, MetricSeries, Operation};
use idlescan::config::{
    AccountConfig, CredentialSourceKind, KindSection, RateEntry, RateUnit, ScanConfig,
};
use idlescan::models::{CycleStatus, ResourceKind, ScanErrorKind};
use idlescan::pipeline::ScanOrchestrator;

const ACCOUNT: &str = "111111111111";

fn account(id: &str, regions: &[&str]) -> AccountConfig {
    AccountConfig {
        account_id: id.to_string(),
        role_name: None,
        regions: regions.iter().map(|r| r.to_string()).collect(),
    }
}

/// Emulated credentials, compute only, one rate for m5.large.
fn compute_config(accounts: Vec<AccountConfig>) -> ScanConfig {
    let mut config = ScanConfig {
        accounts,
        rates: vec![RateEntry {
            region: "*".into(),
            kind: ResourceKind::Compute,
            size: "m5.large".into(),
            monthly_cost: 70.08,
            unit: RateUnit::Resource,
        }],
        ..Default::default()
    };
    config.credentials.source = CredentialSourceKind::Emulated;
    for kind in [ResourceKind::Database, ResourceKind::BlockStorage] {
        config
            .scanners
            .insert(kind, KindSection { enabled: Some(false), ..Default::default() });
    }
    config
}

fn instance(id: &str, account_id: &str, region: &str, cpu: f64) -> FixtureResource {
    FixtureResource::new(id, ResourceKind::Compute, account_id, region)
        .attr("instance_type", "m5.large")
        .attr("state", "running")
        .series("CPUUtilization", MetricSeries::constant(cpu, 336))
}

fn world(resources: Vec<FixtureResource>) -> Fixture {
    resources
        .into_iter()
        .fold(Fixture::new().with_page_size(500), |f, r| f.with_resource(r))
}

#[tokio::test]
async fn empty_world_completes_with_nothing_to_report() {
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(Fixture::new()));
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1"])]);
    config.scanners.clear();

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::Completed);
    assert_eq!(result.targets_total, 3);
    assert_eq!(result.targets_completed, 3);
    assert!(result.findings.is_empty());
    assert!(result.errors.is_empty());
    assert_eq!(result.resources_scanned_count, 0);
}

#[tokio::test]
async fn idle_instance_reported_busy_instance_not() {
    let fixture = world(vec![
        instance("i-idle", ACCOUNT, "us-east-1", 2.0),
        instance("i-busy", ACCOUNT, "us-east-1", 8.0),
    ]);
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let config = compute_config(vec![account(ACCOUNT, &["us-east-1"])]);

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::Completed);
    assert_eq!(result.resources_scanned_count, 2);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].resource.resource_id, "i-idle");
    assert_eq!(result.findings[0].estimated_monthly_savings, 70.08);
    assert_eq!(result.summary.total_monthly_savings, 70.08);
}

#[tokio::test]
async fn repeated_cycles_find_the_same_things() {
    let fixture = world(vec![
        instance("i-1", ACCOUNT, "us-east-1", 1.0),
        instance("i-2", ACCOUNT, "us-east-1", 3.0),
        instance("i-3", ACCOUNT, "eu-west-1", 0.5),
    ]);
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let config = compute_config(vec![account(ACCOUNT, &["us-east-1", "eu-west-1"])]);

    let keys = |result: &idlescan::models::ScanResult| -> BTreeSet<(String, String)> {
        result
            .findings
            .iter()
            .map(|f| (f.resource.resource_id.clone(), f.rule_triggered.clone()))
            .collect()
    };
    let first = orchestrator.run_cycle(&config).await.unwrap();
    let second = orchestrator.run_cycle(&config).await.unwrap();

    assert_eq!(keys(&first).len(), 3);
    assert_eq!(keys(&first), keys(&second));
    assert_ne!(first.cycle_id, second.cycle_id);
}

#[tokio::test]
async fn same_resource_seen_by_two_targets_is_reported_once() {
    let fixture = world(vec![
        instance("i-123", ACCOUNT, "us-east-1", 1.0),
        instance("i-123", ACCOUNT, "us-west-2", 1.0),
    ]);
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let config = compute_config(vec![account(ACCOUNT, &["us-east-1", "us-west-2"])]);

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.resources_scanned_count, 2);
    assert_eq!(result.findings.len(), 1);
    // The first target in submission order wins.
    assert_eq!(result.findings[0].resource.region, "us-east-1");
}

#[tokio::test]
async fn missing_rate_still_reports_finding() {
    let unpriced = FixtureResource::new("i-1", ResourceKind::Compute, ACCOUNT, "us-east-1")
        .attr("instance_type", "x2iedn.32xlarge")
        .attr("state", "running")
        .series("CPUUtilization", MetricSeries::constant(1.0, 336));
    let fixture = world(vec![unpriced]);
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1"])]);
    config.rates.clear();

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].estimated_monthly_savings, 0.0);
    assert!(result.findings[0].estimate_unavailable);
    assert_eq!(result.summary.estimates_unavailable, 1);
}

#[tokio::test]
async fn builtin_prices_apply_without_configured_rates() {
    let fixture = world(vec![instance("i-1", ACCOUNT, "us-east-1", 2.0)]);
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1"])]);
    config.rates.clear();

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.findings.len(), 1);
    assert!(!result.findings[0].estimate_unavailable);
    assert!(result.findings[0].estimated_monthly_savings > 0.0);
    assert_eq!(result.findings[0].estimated_monthly_savings, 70.08);
}

#[tokio::test(start_paused = true)]
async fn slow_target_preempted_by_budget() {
    let fixture = world(vec![
        instance("i-fast", ACCOUNT, "us-east-1", 1.0),
        instance("i-slow", ACCOUNT, "eu-west-1", 1.0),
    ])
    .with_fault(
        Fault::new(Operation::GetMetricData, FaultEffect::Latency { millis: 120_000 }).for_region("eu-west-1"),
    );
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1", "eu-west-1"])]);
    config.scan.timeout_secs = 60;

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::PartiallyFailed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ScanErrorKind::Timeout);
    assert_eq!(result.errors[0].target.region, "eu-west-1");
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].resource.resource_id, "i-fast");
    assert!(result.duration_ms >= 60_000 && result.duration_ms < 120_000);
}

#[tokio::test(start_paused = true)]
async fn hung_client_creation_preempted_by_budget() {
    let fixture = world(vec![
        instance("i-fast", ACCOUNT, "us-east-1", 1.0),
        instance("i-slow", ACCOUNT, "eu-west-1", 1.0),
    ])
    .with_fault(
        Fault::new(Operation::CreateClient, FaultEffect::Latency { millis: 120_000 }).for_region("eu-west-1"),
    );
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1", "eu-west-1"])]);
    config.scan.timeout_secs = 60;

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::PartiallyFailed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ScanErrorKind::Timeout);
    assert_eq!(result.errors[0].target.region, "eu-west-1");
    assert_eq!(result.findings.len(), 1);
    assert!(result.duration_ms >= 60_000 && result.duration_ms < 120_000);
}

#[tokio::test(start_paused = true)]
async fn unstarted_targets_time_out_when_budget_runs_out() {
    let fixture = world(vec![
        instance("i-1", ACCOUNT, "us-east-1", 1.0),
        instance("i-2", ACCOUNT, "us-west-2", 1.0),
        instance("i-3", ACCOUNT, "eu-west-1", 1.0),
    ])
    .with_fault(Fault::new(Operation::GetMetricData, FaultEffect::Latency { millis: 90_000 }));
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1", "us-west-2", "eu-west-1"])]);
    config.scan.timeout_secs = 60;
    config.scan.concurrency = 1;
    config.scan.shutdown_grace_secs = 60;

    let result = orchestrator.run_cycle(&config).await.unwrap();
    // The first target finishes inside the grace period; the others never start.
    assert_eq!(result.status, CycleStatus::PartiallyFailed);
    assert_eq!(result.targets_completed, 1);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.kind == ScanErrorKind::Timeout));
    assert!(result.errors[0].message.contains("not started"));
    assert_eq!(result.errors[0].target.region, "us-west-2");
    assert_eq!(result.errors[1].target.region, "eu-west-1");
}

#[tokio::test(start_paused = true)]
async fn persistent_throttling_is_retryable_error() {
    let fixture = world(vec![
        instance("i-1", ACCOUNT, "us-east-1", 1.0),
        instance("i-2", ACCOUNT, "eu-west-1", 1.0),
    ])
    .with_fault(Fault::new(Operation::GetMetricData, FaultEffect::Throttle).for_region("eu-west-1"));
    let cloud = EmulatedCloud::new(fixture);
    let orchestrator = ScanOrchestrator::emulated(cloud.clone());
    let mut config = compute_config(vec![account(ACCOUNT, &["us-east-1", "eu-west-1"])]);
    config.scan.max_attempts = 3;

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::PartiallyFailed);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].kind, ScanErrorKind::Throttled);
    assert!(result.errors[0].retryable);
    assert_eq!(result.findings.len(), 1);
    // One successful call for us-east-1, three throttled attempts for eu-west-1.
    assert_eq!(cloud.calls(Operation::GetMetricData), 4);
}

fn assume_role_config(accounts: Vec<AccountConfig>) -> ScanConfig {
    let mut config = compute_config(accounts);
    config.credentials.source = CredentialSourceKind::AssumeRole;
    config.credentials.access_key_id = Some("AKIAEXAMPLEBASE".into());
    config.credentials.secret_access_key = Some("base-secret".into());
    for account in config.accounts.iter_mut() {
        account.role_name = Some("IdleScanReadOnly".into());
    }
    config
}

#[tokio::test]
async fn total_credential_failure_fails_cycle() {
    let fixture = world(vec![instance("i-1", ACCOUNT, "us-east-1", 1.0)])
        .with_fault(Fault::new(Operation::AssumeRole, FaultEffect::Deny));
    let cloud = EmulatedCloud::new(fixture);
    let orchestrator = ScanOrchestrator::emulated(cloud.clone());
    let config = assume_role_config(vec![account(ACCOUNT, &["us-east-1", "eu-west-1"])]);

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::Failed);
    assert_eq!(result.targets_completed, 0);
    assert_eq!(result.errors.len(), 2);
    assert!(result.errors.iter().all(|e| e.kind == ScanErrorKind::Denied && !e.retryable));
    assert_eq!(cloud.calls(Operation::ListResources), 0);
}

#[tokio::test]
async fn denied_account_does_not_affect_others() {
    let fixture = world(vec![
        instance("i-ok", ACCOUNT, "us-east-1", 1.0),
        instance("i-hidden", "222222222222", "us-east-1", 1.0),
    ])
    .with_fault(Fault::new(Operation::AssumeRole, FaultEffect::Deny).for_account("222222222222"));
    let orchestrator = ScanOrchestrator::emulated(EmulatedCloud::new(fixture));
    let config = assume_role_config(vec![
        account(ACCOUNT, &["us-east-1"]),
        account("222222222222", &["us-east-1"]),
    ]);

    let result = orchestrator.run_cycle(&config).await.unwrap();
    assert_eq!(result.status, CycleStatus::PartiallyFailed);
    assert_eq!(result.findings.len(), 1);
    assert_eq!(result.findings[0].resource.resource_id, "i-ok");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].target.account_id, "222222222222");
    assert_eq!(result.errors[0].kind, ScanErrorKind::Denied);
}
