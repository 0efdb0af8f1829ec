use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cloud::{ClientPool, MetricDataRequest, METRICS_SERVICE};
use crate::errors::{with_backoff, BackoffPolicy, IdlescanError};
use crate::models::{MetricSample, MetricWindow, ResourceDescriptor, Statistic};
use crate::session::SessionProvider;

/// Upper bound on pages per fetch, so a backend that keeps handing out
/// tokens cannot stall a target forever.
const MAX_PAGES: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricQuery {
    pub metric_name: String,
    pub statistic: Statistic,
}

impl MetricQuery {
    pub fn new(metric_name: &str, statistic: Statistic) -> Self {
        Self {
            metric_name: metric_name.to_string(),
            statistic,
        }
    }
}

/// Fetches utilization time series for resources.
pub struct MetricsGateway {
    sessions: Arc<SessionProvider>,
    pool: Arc<ClientPool>,
    policy: BackoffPolicy,
}

impl MetricsGateway {
    pub fn new(sessions: Arc<SessionProvider>, pool: Arc<ClientPool>, policy: BackoffPolicy) -> Self {
        Self { sessions, pool, policy }
    }

    /// All samples of `query` for `resource` inside `window`, ascending by
    /// timestamp. An empty vector means the resource reported nothing in the
    /// window; any failure to fetch is an `Err`.
    ///
    /// Each page is retried independently under the backoff policy. Throttling
    /// that outlasts the policy surfaces as `Throttled`; permission and
    /// not-found errors surface on the first attempt.
    pub async fn fetch(
        &self,
        resource: &ResourceDescriptor,
        query: &MetricQuery,
        window: &MetricWindow,
        cancel: &CancellationToken,
    ) -> Result<Vec<MetricSample>, IdlescanError> {
        let handle = self.sessions.resolve(&resource.account_id, &resource.region, cancel).await?;
        let client = self.pool.get(&handle, METRICS_SERVICE, cancel).await?;

        let request = MetricDataRequest {
            resource_id: resource.resource_id.clone(),
            resource_kind: resource.kind,
            metric_name: query.metric_name.clone(),
            statistic: query.statistic,
            start: window.start,
            end: window.end,
            period_secs: window.period_secs,
        };

        let mut samples = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0usize;
        loop {
            let page = with_backoff("get_metric_data", &self.policy, cancel, || {
                client.get_metric_data(&handle, &request, token.as_deref())
            })
            .await?;
            pages += 1;
            samples.extend(page.samples);

            match page.next_token {
                Some(next) if pages < MAX_PAGES => token = Some(next),
                Some(_) => {
                    warn!(
                        resource = %resource.resource_id,
                        metric = %query.metric_name,
                        pages,
                        "Metric pagination limit reached, truncating"
                    );
                    break;
                }
                None => break,
            }
        }

        samples.retain(|s| window.contains(s.timestamp));
        samples.sort_by_key(|s| s.timestamp);
        for sample in samples.iter_mut() {
            if sample.metric_name != query.metric_name {
                sample.metric_name = query.metric_name.clone();
            }
        }

        debug!(
            resource = %resource.resource_id,
            metric = %query.metric_name,
            samples = samples.len(),
            pages,
            "Fetched metric samples"
        );
        Ok(samples)
    }
}
