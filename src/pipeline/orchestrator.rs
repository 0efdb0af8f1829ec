use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cloud::{ClientFactory, ClientPool, EmulatedCloud};
use crate::config::{validate_config, KindConfig, ScanConfig};
use crate::cost::{CostEstimator, RateTable};
use crate::errors::IdlescanError;
use crate::metrics::MetricsGateway;
use crate::models::{CycleStatus, ResourceKind, ScanError, ScanResult, ScanTarget};
use crate::reporting::FindingAggregator;
use crate::scanners::{run_target, ScanContext, ScannerRegistry, TargetReport};
use crate::session::{RoleAssumer, SessionProvider};
use super::events::ScanEvent;
use super::state::{terminal_status, CycleState};

enum TargetOutcome {
    Done(TargetReport),
    Failed(ScanError),
}

/// Cross product of accounts × regions × enabled kinds, in configuration
/// order. Every enabled kind must have a registered scanner.
pub fn build_targets(config: &ScanConfig, registry: &ScannerRegistry) -> Result<Vec<ScanTarget>, IdlescanError> {
    let kinds = config.enabled_kinds();
    if let Some(missing) = kinds.iter().find(|k| !registry.contains(**k)) {
        return Err(IdlescanError::Config(format!(
            "No scanner registered for enabled kind '{}'",
            missing
        )));
    }

    let mut targets = Vec::new();
    for account in &config.accounts {
        for region in &account.regions {
            for kind in &kinds {
                targets.push(ScanTarget::new(&account.account_id, region, *kind));
            }
        }
    }
    Ok(targets)
}

/// Shared progress bookkeeping handed to every worker.
#[derive(Clone)]
struct Progress {
    state: Arc<RwLock<CycleState>>,
    event_tx: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl Progress {
    fn emit(&self, event: ScanEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    async fn started(&self, target: &ScanTarget) {
        self.state.write().await.targets_started += 1;
        self.emit(ScanEvent::TargetStarted { target: target.clone() });
    }

    async fn completed(&self, target: &ScanTarget, report: &TargetReport, duration_ms: u64) {
        self.state.write().await.targets_completed += 1;
        self.emit(ScanEvent::TargetCompleted {
            target: target.clone(),
            resources_scanned: report.resources_scanned,
            findings: report.findings.len(),
            duration_ms,
        });
    }

    async fn failed(&self, scan_error: &ScanError) {
        self.state.write().await.targets_failed += 1;
        self.emit(ScanEvent::TargetFailed {
            target: scan_error.target.clone(),
            kind: scan_error.kind,
            error: scan_error.message.clone(),
        });
    }
}

/// Runs scan cycles: fans targets out to scanners under a concurrency
/// ceiling and a wall-clock budget, then merges every outcome into one
/// [`ScanResult`].
pub struct ScanOrchestrator {
    registry: ScannerRegistry,
    pool: Arc<ClientPool>,
    assumer: Option<Arc<dyn RoleAssumer>>,
    state: Arc<RwLock<CycleState>>,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<ScanEvent>>,
}

impl ScanOrchestrator {
    pub fn new(registry: ScannerRegistry, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            registry,
            pool: Arc::new(ClientPool::new(factory)),
            assumer: None,
            state: Arc::new(RwLock::new(CycleState::new())),
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Orchestrator with the built-in scanners, backed entirely by `cloud`.
    pub fn emulated(cloud: EmulatedCloud) -> Self {
        Self::new(ScannerRegistry::builtin(), Arc::new(cloud.clone())).with_role_assumer(Arc::new(cloud))
    }

    pub fn with_role_assumer(mut self, assumer: Arc<dyn RoleAssumer>) -> Self {
        self.assumer = Some(assumer);
        self
    }

    /// Replace the orchestrator's cancel token with an external one. Cancelling
    /// it ends the cycle the same way budget exhaustion does.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Attach an event channel for streaming progress to a display or other consumer.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn progress(&self) -> Progress {
        Progress {
            state: self.state.clone(),
            event_tx: self.event_tx.clone(),
        }
    }

    fn emit(&self, event: ScanEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    /// Run one complete scan cycle.
    ///
    /// Only configuration problems return `Err`, before any target runs.
    /// Every other failure is recorded per target in the result, including
    /// total credential failure, which yields status `Failed`.
    pub async fn run_cycle(&self, config: &ScanConfig) -> Result<ScanResult, IdlescanError> {
        validate_config(config)?;
        let targets = build_targets(config, &self.registry)?;
        let kind_configs: HashMap<ResourceKind, KindConfig> = config
            .enabled_kinds()
            .into_iter()
            .map(|kind| (kind, config.kind_config(kind)))
            .collect();

        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();
        self.state.write().await.begin(cycle_id, targets.len())?;
        info!(
            cycle_id = %cycle_id,
            targets = targets.len(),
            concurrency = config.scan.concurrency,
            budget_secs = config.scan.timeout_secs,
            "Scan cycle started"
        );
        self.emit(ScanEvent::CycleStarted {
            cycle_id,
            targets_total: targets.len(),
        });

        // Dispatch stops at the budget; in-flight work is cancelled after the grace period.
        let dispatch_token = self.cancel_token.child_token();
        let hard_token = self.cancel_token.child_token();
        let deadline = spawn_deadline(
            config.scan.budget(),
            config.scan.grace(),
            dispatch_token.clone(),
            hard_token.clone(),
        );

        let ctx = Arc::new(self.build_context(config, hard_token.clone()));
        let progress = self.progress();

        let mut outcomes: Vec<Option<TargetOutcome>> = targets.iter().map(|_| None).collect();
        let unresolved = preflight(&ctx, &targets).await;
        for (idx, target) in targets.iter().enumerate() {
            if let Some(err) = unresolved.get(&(target.account_id.clone(), target.region.clone())) {
                let scan_error = ScanError::from_error(target.clone(), err);
                progress.failed(&scan_error).await;
                outcomes[idx] = Some(TargetOutcome::Failed(scan_error));
            }
        }

        let semaphore = Arc::new(Semaphore::new(config.scan.concurrency.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, TargetOutcome)>();
        let mut workers: Vec<(usize, JoinHandle<()>)> = Vec::new();

        for (idx, target) in targets.iter().enumerate() {
            if outcomes[idx].is_some() {
                continue;
            }
            let permit = tokio::select! {
                biased;
                _ = dispatch_token.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let (Some(scanner), Some(kind_config)) = (
                self.registry.get(target.resource_kind),
                kind_configs.get(&target.resource_kind).cloned(),
            ) else {
                let scan_error = ScanError::from_error(
                    target.clone(),
                    &IdlescanError::Internal(format!("No scanner for {}", target.resource_kind)),
                );
                progress.failed(&scan_error).await;
                outcomes[idx] = Some(TargetOutcome::Failed(scan_error));
                continue;
            };

            let target = target.clone();
            let ctx = ctx.clone();
            let progress = progress.clone();
            let tx = tx.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                progress.started(&target).await;
                let started = Instant::now();

                let outcome = match run_target(scanner.as_ref(), &ctx, &target, &kind_config).await {
                    Ok(report) => {
                        progress
                            .completed(&target, &report, started.elapsed().as_millis() as u64)
                            .await;
                        TargetOutcome::Done(report)
                    }
                    Err(e) => {
                        warn!(target = %target, error = %e, "Scan target failed");
                        let scan_error = ScanError::from_error(target.clone(), &e);
                        progress.failed(&scan_error).await;
                        TargetOutcome::Failed(scan_error)
                    }
                };
                let _ = tx.send((idx, outcome));
            });
            workers.push((idx, handle));
        }
        drop(tx);

        let (indices, handles): (Vec<usize>, Vec<JoinHandle<()>>) = workers.into_iter().unzip();
        let joined = join_all(handles).await;
        for (idx, result) in indices.into_iter().zip(joined) {
            if let Err(e) = result {
                error!(target = %targets[idx], error = %e, "Scan worker panicked");
                let scan_error = ScanError::from_error(
                    targets[idx].clone(),
                    &IdlescanError::Internal(format!("scan worker panicked: {}", e)),
                );
                progress.failed(&scan_error).await;
                outcomes[idx] = Some(TargetOutcome::Failed(scan_error));
            }
        }
        while let Some((idx, outcome)) = rx.recv().await {
            outcomes[idx] = Some(outcome);
        }
        deadline.abort();

        let reason = if self.cancel_token.is_cancelled() {
            "not started: scan cycle cancelled"
        } else {
            "not started: scan cycle budget exhausted"
        };
        for (idx, slot) in outcomes.iter_mut().enumerate() {
            if slot.is_none() {
                let scan_error = ScanError::timeout(targets[idx].clone(), reason);
                progress.failed(&scan_error).await;
                *slot = Some(TargetOutcome::Failed(scan_error));
            }
        }

        let mut findings = Vec::new();
        let mut errors = Vec::new();
        let mut targets_completed = 0;
        let mut resources_scanned_count = 0;
        let mut resources_excluded = 0;
        let mut rules_skipped = 0;
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                TargetOutcome::Done(report) => {
                    targets_completed += 1;
                    resources_scanned_count += report.resources_scanned;
                    resources_excluded += report.resources_excluded;
                    rules_skipped += report.rules_skipped;
                    findings.extend(report.findings);
                }
                TargetOutcome::Failed(scan_error) => errors.push(scan_error),
            }
        }

        let aggregated = FindingAggregator::new().aggregate(findings);
        let status = terminal_status(targets_completed, &errors);
        self.state.write().await.transition(status)?;
        let duration_ms = clock.elapsed().as_millis() as u64;

        if status == CycleStatus::Failed {
            error!(cycle_id = %cycle_id, errors = errors.len(), "Scan cycle failed: no target could be processed");
        } else {
            info!(
                cycle_id = %cycle_id,
                status = %status,
                findings = aggregated.summary.total_findings,
                errors = errors.len(),
                duration_ms,
                "Scan cycle finished"
            );
        }
        self.emit(ScanEvent::CycleCompleted {
            status,
            total_findings: aggregated.summary.total_findings,
            total_monthly_savings: aggregated.summary.total_monthly_savings,
            duration_ms,
        });

        Ok(ScanResult {
            cycle_id,
            status,
            started_at,
            finished_at: Utc::now(),
            duration_ms,
            targets_total: targets.len(),
            targets_completed,
            resources_scanned_count,
            resources_excluded,
            rules_skipped,
            findings: aggregated.findings,
            errors,
            summary: aggregated.summary,
        })
    }

    fn build_context(&self, config: &ScanConfig, cancel: CancellationToken) -> ScanContext {
        let mut sessions = SessionProvider::new(config);
        if let Some(ref assumer) = self.assumer {
            sessions = sessions.with_role_assumer(assumer.clone());
        }
        let sessions = Arc::new(sessions);
        let policy = config.scan.backoff_policy();
        ScanContext {
            metrics: Arc::new(MetricsGateway::new(sessions.clone(), self.pool.clone(), policy.clone())),
            sessions,
            pool: self.pool.clone(),
            estimator: Arc::new(CostEstimator::new(RateTable::with_builtin(&config.rates))),
            policy,
            metric_period_secs: config.scan.metric_period_secs,
            now: Utc::now(),
            cancel,
        }
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn state(&self) -> Arc<RwLock<CycleState>> {
        self.state.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn registry(&self) -> &ScannerRegistry {
        &self.registry
    }
}

/// Resolve a handle for every distinct account/region once, up front.
/// Returns the failures; their targets are never dispatched.
async fn preflight(ctx: &ScanContext, targets: &[ScanTarget]) -> HashMap<(String, String), IdlescanError> {
    let mut seen = HashSet::new();
    let pairs: Vec<(String, String)> = targets
        .iter()
        .map(|t| (t.account_id.clone(), t.region.clone()))
        .filter(|pair| seen.insert(pair.clone()))
        .collect();

    let results = join_all(
        pairs
            .iter()
            .map(|(account, region)| ctx.sessions.resolve(account, region, &ctx.cancel)),
    )
    .await;

    pairs
        .into_iter()
        .zip(results)
        .filter_map(|(pair, result)| match result {
            Ok(_) => None,
            Err(e) => {
                warn!(account = %pair.0, region = %pair.1, error = %e, "Credential resolution failed, skipping region");
                Some((pair, e))
            }
        })
        .collect()
}

fn spawn_deadline(
    budget: Duration,
    grace: Duration,
    dispatch: CancellationToken,
    hard: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = hard.cancelled() => return,
            _ = tokio::time::sleep(budget) => {}
        }
        warn!(budget_secs = budget.as_secs(), "Scan cycle budget exhausted, no new targets will start");
        dispatch.cancel();
        tokio::select! {
            _ = hard.cancelled() => {}
            _ = tokio::time::sleep(grace) => {}
        }
        hard.cancel();
    })
}
