use std::collections::HashMap;
use std::sync::Arc;

use crate::models::ResourceKind;
use super::block_storage::BlockStorageScanner;
use super::compute::ComputeScanner;
use super::database::DatabaseScanner;
use super::function::FunctionScanner;
use super::load_balancer::LoadBalancerScanner;
use super::Scanner;

/// Kind → scanner lookup. The orchestrator only ever asks this registry, so
/// adding a kind means registering one more scanner here.
#[derive(Clone, Default)]
pub struct ScannerRegistry {
    scanners: HashMap<ResourceKind, Arc<dyn Scanner>>,
}

impl ScannerRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with every built-in scanner.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(ComputeScanner));
        registry.register(Arc::new(DatabaseScanner));
        registry.register(Arc::new(BlockStorageScanner));
        registry.register(Arc::new(LoadBalancerScanner));
        registry.register(Arc::new(FunctionScanner));
        registry
    }

    /// Register `scanner` under its kind, replacing any previous one.
    pub fn register(&mut self, scanner: Arc<dyn Scanner>) -> &mut Self {
        self.scanners.insert(scanner.kind(), scanner);
        self
    }

    pub fn get(&self, kind: ResourceKind) -> Option<Arc<dyn Scanner>> {
        self.scanners.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.scanners.contains_key(&kind)
    }

    /// Registered kinds in canonical order.
    pub fn kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL.iter().copied().filter(|k| self.contains(*k)).collect()
    }
}
