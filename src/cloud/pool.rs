use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::IdlescanError;
use crate::session::Handle;
use crate::utils::cancel::cancellable;
use super::client::{ClientFactory, ClientKey, CloudApi};

type ClientCell = Arc<OnceCell<Arc<dyn CloudApi>>>;

/// Process-lifetime pool of remote clients.
///
/// Each key owns a once-cell: concurrent first callers wait on a single
/// `ClientFactory::create`, and nobody observes a half-built client. A failed
/// creation leaves the cell empty so a later caller can try again, and so does
/// a creation abandoned because `cancel` fired. Clients are never evicted.
pub struct ClientPool {
    factory: Arc<dyn ClientFactory>,
    clients: DashMap<ClientKey, ClientCell>,
}

impl ClientPool {
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            clients: DashMap::new(),
        }
    }

    pub async fn get(
        &self,
        handle: &Handle,
        service: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<dyn CloudApi>, IdlescanError> {
        let key = ClientKey::new(&handle.account_id, &handle.region, service);
        // Clone the cell out so no map shard lock is held across the await.
        let cell = self.clients.entry(key.clone()).or_default().clone();
        let client = cancellable(cancel, "client creation", async {
            cell.get_or_try_init(|| async {
                debug!(client = %key, "Creating client");
                self.factory.create(&key, handle).await
            })
            .await
            .cloned()
        })
        .await?;
        Ok(client)
    }

    /// Number of clients that finished initializing.
    pub fn len(&self) -> usize {
        self.clients.iter().filter(|entry| entry.value().initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::client::{MetricDataPage, MetricDataRequest, ResourcePage};
    use crate::config::CredentialSourceKind;
    use crate::models::ResourceKind;
    use crate::session::SessionCredentials;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullClient(String);

    #[async_trait]
    impl CloudApi for NullClient {
        fn service(&self) -> &str {
            &self.0
        }

        async fn list_resources(
            &self,
            _handle: &Handle,
            _kind: ResourceKind,
            _next_token: Option<&str>,
        ) -> Result<ResourcePage, IdlescanError> {
            Ok(ResourcePage::default())
        }

        async fn get_metric_data(
            &self,
            _handle: &Handle,
            _request: &MetricDataRequest,
            _next_token: Option<&str>,
        ) -> Result<MetricDataPage, IdlescanError> {
            Ok(MetricDataPage::default())
        }
    }

    struct SlowFactory {
        created: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl ClientFactory for SlowFactory {
        async fn create(&self, key: &ClientKey, _handle: &Handle) -> Result<Arc<dyn CloudApi>, IdlescanError> {
            let n = self.created.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            if self.fail_first && n == 0 {
                return Err(IdlescanError::Network("connection refused".into()));
            }
            Ok(Arc::new(NullClient(key.service.clone())))
        }
    }

    fn handle(region: &str) -> Handle {
        Handle {
            account_id: "111111111111".into(),
            region: region.into(),
            origin: CredentialSourceKind::Emulated,
            credentials: SessionCredentials::new("test", "test"),
            endpoint: None,
            issued_at: Utc::now(),
            expires_at: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_first_use_creates_once() {
        let factory = Arc::new(SlowFactory { created: AtomicUsize::new(0), fail_first: false });
        let pool = Arc::new(ClientPool::new(factory.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    pool.get(&handle("us-east-1"), "ec2", &CancellationToken::new()).await
                })
            })
            .collect();
        let clients: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(pool.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_distinct_keys_get_distinct_clients() {
        let factory = Arc::new(SlowFactory { created: AtomicUsize::new(0), fail_first: false });
        let pool = ClientPool::new(factory.clone());

        let ec2 = pool.get(&handle("us-east-1"), "ec2", &CancellationToken::new()).await.unwrap();
        let metrics = pool.get(&handle("us-east-1"), "cloudwatch", &CancellationToken::new()).await.unwrap();
        let other_region = pool.get(&handle("eu-west-1"), "ec2", &CancellationToken::new()).await.unwrap();

        assert_eq!(ec2.service(), "ec2");
        assert_eq!(metrics.service(), "cloudwatch");
        assert!(!Arc::ptr_eq(&ec2, &other_region));
        assert_eq!(factory.created.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_creation_is_retried_on_next_get() {
        let factory = Arc::new(SlowFactory { created: AtomicUsize::new(0), fail_first: true });
        let pool = ClientPool::new(factory.clone());

        assert!(pool.get(&handle("us-east-1"), "ec2", &CancellationToken::new()).await.is_err());
        assert!(pool.is_empty());
        assert!(pool.get(&handle("us-east-1"), "ec2", &CancellationToken::new()).await.is_ok());
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_creation_times_out_and_leaves_cell_empty() {
        let factory = Arc::new(SlowFactory { created: AtomicUsize::new(0), fail_first: false });
        let pool = ClientPool::new(factory.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = pool.get(&handle("us-east-1"), "ec2", &cancel).await;
        assert!(matches!(result, Err(IdlescanError::Timeout(_))));
        assert!(pool.is_empty());

        assert!(pool.get(&handle("us-east-1"), "ec2", &CancellationToken::new()).await.is_ok());
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }
}
