use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::IdlescanError;
use crate::models::{MetricSample, ResourceDescriptor, ResourceKind, Statistic};
use crate::session::Handle;

/// Service that serves metric time series.
pub const METRICS_SERVICE: &str = "cloudwatch";

/// Pool key: one client per account, region and service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub account_id: String,
    pub region: String,
    pub service: String,
}

impl ClientKey {
    pub fn new(account_id: &str, region: &str, service: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            service: service.to_string(),
        }
    }
}

impl std::fmt::Display for ClientKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.region, self.service)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResourcePage {
    pub resources: Vec<ResourceDescriptor>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MetricDataRequest {
    pub resource_id: String,
    pub resource_kind: ResourceKind,
    pub metric_name: String,
    pub statistic: Statistic,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub period_secs: u32,
}

#[derive(Debug, Clone, Default)]
pub struct MetricDataPage {
    pub samples: Vec<MetricSample>,
    pub next_token: Option<String>,
}

/// Read-only remote API surface used by scanners and the metrics gateway.
///
/// The caller passes its current handle on every call so a pooled client
/// never holds on to expired credentials.
#[async_trait]
pub trait CloudApi: Send + Sync {
    fn service(&self) -> &str;

    async fn list_resources(
        &self,
        handle: &Handle,
        kind: ResourceKind,
        next_token: Option<&str>,
    ) -> Result<ResourcePage, IdlescanError>;

    async fn get_metric_data(
        &self,
        handle: &Handle,
        request: &MetricDataRequest,
        next_token: Option<&str>,
    ) -> Result<MetricDataPage, IdlescanError>;
}

/// Builds a client for a pool key.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(&self, key: &ClientKey, handle: &Handle) -> Result<Arc<dyn CloudApi>, IdlescanError>;
}
