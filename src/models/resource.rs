use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::IdlescanError;

/// Kind of cloud resource a scanner is responsible for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceKind {
    Compute,
    Database,
    BlockStorage,
    LoadBalancer,
    Function,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Compute,
        ResourceKind::Database,
        ResourceKind::BlockStorage,
        ResourceKind::LoadBalancer,
        ResourceKind::Function,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Database => "database",
            Self::BlockStorage => "block-storage",
            Self::LoadBalancer => "load-balancer",
            Self::Function => "function",
        }
    }

    /// Attribute that selects the rate-table row for this kind.
    pub fn size_attribute(&self) -> &'static str {
        match self {
            Self::Compute => "instance_type",
            Self::Database => "db_class",
            Self::BlockStorage => "volume_type",
            Self::LoadBalancer => "lb_type",
            Self::Function => "memory_mb",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = IdlescanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| IdlescanError::Config(format!("Unknown resource kind: {}", s)))
    }
}

/// A resource observed by a scanner's listing step during the current cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub resource_id: String,
    pub kind: ResourceKind,
    pub region: String,
    pub account_id: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl ResourceDescriptor {
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }

    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }

    pub fn attr_time(&self, key: &str) -> Option<DateTime<Utc>> {
        self.attr_str(key)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc))
    }

    /// Attribute rendered as a plain string, so numeric sizes such as
    /// `memory_mb: 512` can key a rate table.
    pub fn attr_display(&self, key: &str) -> Option<String> {
        match self.attributes.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Whole days elapsed since the timestamp stored under `key`.
    pub fn age_days(&self, key: &str, now: DateTime<Utc>) -> Option<i64> {
        self.attr_time(key).map(|t| (now - t).num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn volume() -> ResourceDescriptor {
        let mut attributes = BTreeMap::new();
        attributes.insert("volume_type".to_string(), json!("gp3"));
        attributes.insert("size_gb".to_string(), json!(100));
        attributes.insert("create_time".to_string(), json!("2024-01-01T00:00:00Z"));
        ResourceDescriptor {
            resource_id: "vol-1".into(),
            kind: ResourceKind::BlockStorage,
            region: "us-east-1".into(),
            account_id: "111111111111".into(),
            tags: BTreeMap::new(),
            attributes,
        }
    }

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ResourceKind::ALL {
            assert_eq!(kind.as_str().parse::<ResourceKind>().unwrap(), kind);
        }
        assert!("queue".parse::<ResourceKind>().is_err());
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ResourceKind::BlockStorage).unwrap();
        assert_eq!(json, "\"block-storage\"");
    }

    #[test]
    fn test_attribute_accessors() {
        let v = volume();
        assert_eq!(v.attr_str("volume_type"), Some("gp3"));
        assert_eq!(v.attr_f64("size_gb"), Some(100.0));
        assert_eq!(v.attr_display("size_gb").as_deref(), Some("100"));
        assert!(v.attr_str("missing").is_none());
    }

    #[test]
    fn test_age_days() {
        let v = volume();
        let now = DateTime::parse_from_rfc3339("2024-02-01T00:00:00Z").unwrap().with_timezone(&Utc);
        assert_eq!(v.age_days("create_time", now), Some(31));
    }
}
