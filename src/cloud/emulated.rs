//! In-process emulated cloud endpoint.
//!
//! Serves a fixed world of resources and metric series described in YAML (or
//! built in code), with optional fault injection. It stands in for the
//! remote provider in offline runs and in tests, and implements the same
//! seams a real backend would: [`ClientFactory`], [`CloudApi`] and
//! [`RoleAssumer`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::IdlescanError;
use crate::models::{MetricSample, ResourceDescriptor, ResourceKind};
use crate::session::{AssumedRole, Handle, RoleAssumer, SessionCredentials};
use super::client::{ClientFactory, ClientKey, CloudApi, MetricDataPage, MetricDataRequest, ResourcePage};

fn default_page_size() -> usize {
    50
}

fn default_interval_hours() -> u32 {
    1
}

/// A metric time series ending at the moment the emulator starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricSeries {
    /// Explicit datapoints, oldest first.
    #[serde(default)]
    pub values: Vec<f64>,
    /// Alternative to `values`: a flat series of `hours` worth of points.
    #[serde(default)]
    pub constant: Option<f64>,
    #[serde(default)]
    pub hours: Option<u32>,
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,
}

impl MetricSeries {
    pub fn constant(value: f64, hours: u32) -> Self {
        Self {
            values: Vec::new(),
            constant: Some(value),
            hours: Some(hours),
            interval_hours: 1,
        }
    }

    pub fn values(values: Vec<f64>) -> Self {
        Self {
            values,
            interval_hours: 1,
            ..Default::default()
        }
    }

    fn points(&self) -> Vec<f64> {
        if !self.values.is_empty() {
            return self.values.clone();
        }
        match (self.constant, self.hours) {
            (Some(value), Some(hours)) => {
                let count = hours / self.interval_hours.max(1);
                vec![value; count as usize]
            }
            _ => Vec::new(),
        }
    }

    fn samples(&self, metric_name: &str, anchor: DateTime<Utc>) -> Vec<MetricSample> {
        let points = self.points();
        let step = chrono::Duration::hours(i64::from(self.interval_hours.max(1)));
        let last = points.len().saturating_sub(1) as i32;
        points
            .into_iter()
            .enumerate()
            .map(|(i, value)| MetricSample {
                timestamp: anchor - step * (last - i as i32),
                metric_name: metric_name.to_string(),
                value,
            })
            .collect()
    }
}

/// One resource of the emulated world together with its metric series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureResource {
    #[serde(flatten)]
    pub descriptor: ResourceDescriptor,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricSeries>,
}

impl FixtureResource {
    pub fn new(resource_id: &str, kind: ResourceKind, account_id: &str, region: &str) -> Self {
        Self {
            descriptor: ResourceDescriptor {
                resource_id: resource_id.to_string(),
                kind,
                region: region.to_string(),
                account_id: account_id.to_string(),
                tags: BTreeMap::new(),
                attributes: BTreeMap::new(),
            },
            metrics: BTreeMap::new(),
        }
    }

    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.descriptor.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.descriptor.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn series(mut self, metric_name: &str, series: MetricSeries) -> Self {
        self.metrics.insert(metric_name.to_string(), series);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ListResources,
    GetMetricData,
    AssumeRole,
    CreateClient,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultEffect {
    Throttle,
    Deny,
    NotFound,
    Unavailable,
    /// Delay the call, then let it proceed.
    Latency { millis: u64 },
}

/// An injected failure. Unset selectors match anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fault {
    pub operation: Operation,
    pub effect: FaultEffect,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub kind: Option<ResourceKind>,
    #[serde(default)]
    pub resource_id: Option<String>,
    #[serde(default)]
    pub metric_name: Option<String>,
    /// Number of calls affected; every call when unset.
    #[serde(default)]
    pub times: Option<u32>,
}

impl Fault {
    pub fn new(operation: Operation, effect: FaultEffect) -> Self {
        Self {
            operation,
            effect,
            account_id: None,
            region: None,
            kind: None,
            resource_id: None,
            metric_name: None,
            times: None,
        }
    }

    pub fn for_account(mut self, account_id: &str) -> Self {
        self.account_id = Some(account_id.to_string());
        self
    }

    pub fn for_region(mut self, region: &str) -> Self {
        self.region = Some(region.to_string());
        self
    }

    pub fn for_kind(mut self, kind: ResourceKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn for_resource(mut self, resource_id: &str) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn times(mut self, times: u32) -> Self {
        self.times = Some(times);
        self
    }

    fn selects(&self, call: &CallInfo<'_>) -> bool {
        fn field_matches<T: PartialEq + ?Sized>(want: Option<&T>, got: Option<&T>) -> bool {
            match want {
                None => true,
                Some(w) => got.map_or(false, |g| g == w),
            }
        }
        self.operation == call.operation
            && field_matches(self.account_id.as_deref(), Some(call.account_id))
            && field_matches(self.region.as_deref(), Some(call.region))
            && field_matches(self.kind.as_ref(), call.kind.as_ref())
            && field_matches(self.resource_id.as_deref(), call.resource_id)
            && field_matches(self.metric_name.as_deref(), call.metric_name)
    }
}

/// Description of the emulated world.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fixture {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub resources: Vec<FixtureResource>,
    #[serde(default)]
    pub faults: Vec<Fault>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            resources: Vec::new(),
            faults: Vec::new(),
        }
    }
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml(content: &str) -> Result<Self, IdlescanError> {
        serde_yaml::from_str(content).map_err(|e| IdlescanError::Config(format!("Invalid fixture: {}", e)))
    }

    pub async fn load(path: &Path) -> Result<Self, IdlescanError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            IdlescanError::Config(format!("Cannot read fixture {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_resource(mut self, resource: FixtureResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.faults.push(fault);
        self
    }
}

struct CallInfo<'a> {
    operation: Operation,
    account_id: &'a str,
    region: &'a str,
    kind: Option<ResourceKind>,
    resource_id: Option<&'a str>,
    metric_name: Option<&'a str>,
}

struct ArmedFault {
    fault: Fault,
    hits: AtomicU32,
}

struct World {
    page_size: usize,
    resources: Vec<FixtureResource>,
    faults: Vec<ArmedFault>,
    anchor: DateTime<Utc>,
    calls: DashMap<Operation, usize>,
}

impl World {
    async fn enter(&self, call: CallInfo<'_>) -> Result<(), IdlescanError> {
        *self.calls.entry(call.operation).or_insert(0) += 1;

        for armed in &self.faults {
            if !armed.fault.selects(&call) {
                continue;
            }
            let prior = armed.hits.fetch_add(1, Ordering::SeqCst);
            if armed.fault.times.map_or(false, |limit| prior >= limit) {
                continue;
            }
            let what = format!("{:?} {}/{}", call.operation, call.account_id, call.region);
            match &armed.fault.effect {
                FaultEffect::Latency { millis } => {
                    debug!(call = %what, millis, "Injected latency");
                    tokio::time::sleep(Duration::from_millis(*millis)).await;
                }
                FaultEffect::Throttle => {
                    return Err(IdlescanError::Throttled(format!("{}: Rate exceeded", what)));
                }
                FaultEffect::Deny => {
                    return Err(IdlescanError::Permission(format!("{}: AccessDenied", what)));
                }
                FaultEffect::NotFound => {
                    return Err(IdlescanError::NotFound(format!("{}: resource does not exist", what)));
                }
                FaultEffect::Unavailable => {
                    return Err(IdlescanError::Network(format!("{}: service unavailable", what)));
                }
            }
        }
        Ok(())
    }
}

fn check_handle(handle: &Handle) -> Result<(), IdlescanError> {
    if handle.is_expired(Utc::now()) {
        return Err(IdlescanError::Auth(format!(
            "ExpiredToken: session for {}/{} has expired",
            handle.account_id, handle.region
        )));
    }
    Ok(())
}

fn parse_token(token: Option<&str>) -> Result<usize, IdlescanError> {
    match token {
        None => Ok(0),
        Some(t) => t
            .parse()
            .map_err(|_| IdlescanError::Internal(format!("Invalid pagination token: {}", t))),
    }
}

fn next_token(offset: usize, page_len: usize, total: usize) -> Option<String> {
    let next = offset + page_len;
    (next < total).then(|| next.to_string())
}

/// Emulated endpoint. Cheap to clone; clones share state and counters.
#[derive(Clone)]
pub struct EmulatedCloud {
    world: Arc<World>,
}

impl EmulatedCloud {
    pub fn new(fixture: Fixture) -> Self {
        Self {
            world: Arc::new(World {
                page_size: fixture.page_size.max(1),
                resources: fixture.resources,
                faults: fixture
                    .faults
                    .into_iter()
                    .map(|fault| ArmedFault { fault, hits: AtomicU32::new(0) })
                    .collect(),
                anchor: Utc::now(),
                calls: DashMap::new(),
            }),
        }
    }

    /// Calls received for `operation`, including failed ones.
    pub fn calls(&self, operation: Operation) -> usize {
        self.world.calls.get(&operation).map_or(0, |c| *c)
    }
}

#[async_trait]
impl ClientFactory for EmulatedCloud {
    async fn create(&self, key: &ClientKey, handle: &Handle) -> Result<Arc<dyn CloudApi>, IdlescanError> {
        self.world
            .enter(CallInfo {
                operation: Operation::CreateClient,
                account_id: &handle.account_id,
                region: &handle.region,
                kind: None,
                resource_id: None,
                metric_name: None,
            })
            .await?;
        Ok(Arc::new(EmulatedClient {
            world: self.world.clone(),
            service: key.service.clone(),
        }))
    }
}

#[async_trait]
impl RoleAssumer for EmulatedCloud {
    async fn assume_role(
        &self,
        _base: &SessionCredentials,
        role_arn: &str,
        region: &str,
        duration: Duration,
    ) -> Result<AssumedRole, IdlescanError> {
        let account_id = role_arn
            .strip_prefix("arn:aws:iam::")
            .and_then(|rest| rest.split(':').next())
            .ok_or_else(|| IdlescanError::Auth(format!("Malformed role ARN: {}", role_arn)))?;
        self.world
            .enter(CallInfo {
                operation: Operation::AssumeRole,
                account_id,
                region,
                kind: None,
                resource_id: None,
                metric_name: None,
            })
            .await
            .map_err(|e| match e {
                IdlescanError::Permission(msg) => IdlescanError::Auth(format!(
                    "{} is not authorized to perform sts:AssumeRole ({})",
                    role_arn, msg
                )),
                other => other,
            })?;

        let lifetime = chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::hours(1));
        let n = self.calls(Operation::AssumeRole);
        Ok(AssumedRole {
            credentials: SessionCredentials::new(&format!("ASIAEMULATED{:08}", n), "emulated-secret")
                .with_session_token(format!("emulated-session-{}", n)),
            expires_at: Utc::now() + lifetime,
        })
    }
}

struct EmulatedClient {
    world: Arc<World>,
    service: String,
}

#[async_trait]
impl CloudApi for EmulatedClient {
    fn service(&self) -> &str {
        &self.service
    }

    async fn list_resources(
        &self,
        handle: &Handle,
        kind: ResourceKind,
        next: Option<&str>,
    ) -> Result<ResourcePage, IdlescanError> {
        check_handle(handle)?;
        self.world
            .enter(CallInfo {
                operation: Operation::ListResources,
                account_id: &handle.account_id,
                region: &handle.region,
                kind: Some(kind),
                resource_id: None,
                metric_name: None,
            })
            .await?;

        let matching: Vec<&ResourceDescriptor> = self
            .world
            .resources
            .iter()
            .map(|r| &r.descriptor)
            .filter(|d| d.kind == kind && d.account_id == handle.account_id && d.region == handle.region)
            .collect();
        let offset = parse_token(next)?;
        let page: Vec<ResourceDescriptor> = matching
            .iter()
            .skip(offset)
            .take(self.world.page_size)
            .map(|d| (*d).clone())
            .collect();
        let next_token = next_token(offset, page.len(), matching.len());
        Ok(ResourcePage { resources: page, next_token })
    }

    async fn get_metric_data(
        &self,
        handle: &Handle,
        request: &MetricDataRequest,
        next: Option<&str>,
    ) -> Result<MetricDataPage, IdlescanError> {
        check_handle(handle)?;
        self.world
            .enter(CallInfo {
                operation: Operation::GetMetricData,
                account_id: &handle.account_id,
                region: &handle.region,
                kind: Some(request.resource_kind),
                resource_id: Some(&request.resource_id),
                metric_name: Some(&request.metric_name),
            })
            .await?;

        let resource = self
            .world
            .resources
            .iter()
            .find(|r| {
                r.descriptor.resource_id == request.resource_id
                    && r.descriptor.account_id == handle.account_id
                    && r.descriptor.region == handle.region
            })
            .ok_or_else(|| IdlescanError::NotFound(format!("No such resource: {}", request.resource_id)))?;

        let in_window: Vec<MetricSample> = resource
            .metrics
            .get(&request.metric_name)
            .map(|series| series.samples(&request.metric_name, self.world.anchor))
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.timestamp >= request.start && s.timestamp <= request.end)
            .collect();

        let offset = parse_token(next)?;
        let samples: Vec<MetricSample> = in_window.iter().skip(offset).take(self.world.page_size).cloned().collect();
        let next_token = next_token(offset, samples.len(), in_window.len());
        Ok(MetricDataPage { samples, next_token })
    }
}
