use serde::{Deserialize, Serialize};

use super::resource::ResourceKind;

/// One unit of scan work: a resource kind in one account and region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    pub account_id: String,
    pub region: String,
    pub resource_kind: ResourceKind,
}

impl ScanTarget {
    pub fn new(account_id: &str, region: &str, resource_kind: ResourceKind) -> Self {
        Self {
            account_id: account_id.to_string(),
            region: region.to_string(),
            resource_kind,
        }
    }
}

impl std::fmt::Display for ScanTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.region, self.resource_kind)
    }
}
