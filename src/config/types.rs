use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::BackoffPolicy;
use crate::models::{ResourceKind, ThresholdRule};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanConfig {
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub scan: ExecutionConfig,
    #[serde(default)]
    pub scanners: BTreeMap<ResourceKind, KindSection>,
    #[serde(default)]
    pub rates: Vec<RateEntry>,
}

impl ScanConfig {
    /// Resolved settings for `kind`: the file's section merged over the
    /// built-in defaults for that kind.
    pub fn kind_config(&self, kind: ResourceKind) -> KindConfig {
        let defaults = KindConfig::defaults_for(kind);
        match self.scanners.get(&kind) {
            Some(section) => section.resolve(defaults),
            None => defaults,
        }
    }

    /// Enabled kinds in their canonical order.
    pub fn enabled_kinds(&self) -> Vec<ResourceKind> {
        ResourceKind::ALL
            .iter()
            .copied()
            .filter(|k| self.kind_config(*k).enabled)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    pub account_id: String,
    /// Role assumed in this account when credentials come from role assumption.
    #[serde(default)]
    pub role_name: Option<String>,
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialSourceKind {
    #[default]
    Default,
    AssumeRole,
    Emulated,
}

impl CredentialSourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AssumeRole => "assume-role",
            Self::Emulated => "emulated",
        }
    }
}

fn default_session_duration() -> u64 {
    3600
}

fn default_refresh_margin() -> u64 {
    300
}

#[derive(Clone, Deserialize, Serialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub source: CredentialSourceKind,
    #[serde(default)]
    pub profile: Option<String>,
    /// Literal key or `$ENV_VAR` reference.
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    /// Endpoint of the emulated cloud, for `source: emulated`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_session_duration")]
    pub session_duration_secs: u64,
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            source: CredentialSourceKind::default(),
            profile: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            endpoint: None,
            session_duration_secs: default_session_duration(),
            refresh_margin_secs: default_refresh_margin(),
        }
    }
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("CredentialsConfig")
            .field("source", &self.source)
            .field("profile", &self.profile)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &redact(&self.secret_access_key))
            .field("session_token", &redact(&self.session_token))
            .field("endpoint", &self.endpoint)
            .field("session_duration_secs", &self.session_duration_secs)
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .finish()
    }
}

impl CredentialsConfig {
    pub fn refresh_margin(&self) -> Duration {
        Duration::from_secs(self.refresh_margin_secs)
    }

    pub fn session_duration(&self) -> Duration {
        Duration::from_secs(self.session_duration_secs)
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_timeout() -> u64 {
    900
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_metric_period() -> u32 {
    3600
}

/// Global execution budget for a scan cycle.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Wall-clock budget for the whole cycle.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Time in-flight targets may keep running after the budget is spent.
    #[serde(default)]
    pub shutdown_grace_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_metric_period")]
    pub metric_period_secs: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            timeout_secs: default_timeout(),
            shutdown_grace_secs: 0,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            metric_period_secs: default_metric_period(),
        }
    }
}

impl ExecutionConfig {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: true,
        }
    }
}

/// Tag exclusion: a bare key matches any value, a single-entry map matches
/// that exact key/value pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TagMatcher {
    Key(String),
    Pair(BTreeMap<String, String>),
}

impl TagMatcher {
    pub fn matches(&self, tags: &BTreeMap<String, String>) -> bool {
        match self {
            TagMatcher::Key(key) => tags.contains_key(key),
            TagMatcher::Pair(pairs) => pairs
                .iter()
                .any(|(k, v)| tags.get(k).map_or(false, |actual| actual == v)),
        }
    }
}

/// Per-kind section as written in the config file; every field is optional
/// so that built-in defaults fill the gaps.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct KindSection {
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub days_to_check: Option<u32>,
    #[serde(default)]
    pub exclude_tags: Option<Vec<TagMatcher>>,
    #[serde(default)]
    pub exclude_types: Option<Vec<String>>,
    #[serde(default)]
    pub include_types: Option<Vec<String>>,
    #[serde(default)]
    pub minimum_age_days: Option<u32>,
    #[serde(default)]
    pub rules: Option<Vec<ThresholdRule>>,
    /// Shorthand thresholds such as `cpu_threshold: 5`.
    #[serde(flatten)]
    pub thresholds: BTreeMap<String, f64>,
}

impl KindSection {
    pub fn resolve(&self, defaults: KindConfig) -> KindConfig {
        let mut thresholds = defaults.thresholds;
        thresholds.extend(self.thresholds.iter().map(|(k, v)| (k.clone(), *v)));
        KindConfig {
            kind: defaults.kind,
            enabled: self.enabled.unwrap_or(defaults.enabled),
            days_to_check: self.days_to_check.unwrap_or(defaults.days_to_check),
            exclude_tags: self.exclude_tags.clone().unwrap_or(defaults.exclude_tags),
            exclude_types: self.exclude_types.clone().unwrap_or(defaults.exclude_types),
            include_types: self.include_types.clone().unwrap_or(defaults.include_types),
            minimum_age_days: self.minimum_age_days.or(defaults.minimum_age_days),
            rules: self.rules.clone().unwrap_or(defaults.rules),
            thresholds,
        }
    }
}

/// Fully resolved settings for one resource kind.
#[derive(Debug, Clone, PartialEq)]
pub struct KindConfig {
    pub kind: ResourceKind,
    pub enabled: bool,
    pub days_to_check: u32,
    pub exclude_tags: Vec<TagMatcher>,
    pub exclude_types: Vec<String>,
    /// Allow-list of types; empty admits every type.
    pub include_types: Vec<String>,
    pub minimum_age_days: Option<u32>,
    /// Explicit rules; when empty the scanner derives rules from `thresholds`.
    pub rules: Vec<ThresholdRule>,
    pub thresholds: BTreeMap<String, f64>,
}

impl KindConfig {
    pub fn defaults_for(kind: ResourceKind) -> Self {
        let base = Self {
            kind,
            enabled: false,
            days_to_check: 14,
            exclude_tags: Vec::new(),
            exclude_types: Vec::new(),
            include_types: Vec::new(),
            minimum_age_days: None,
            rules: Vec::new(),
            thresholds: BTreeMap::new(),
        };
        let thresholds = |pairs: &[(&str, f64)]| -> BTreeMap<String, f64> {
            pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
        };
        match kind {
            ResourceKind::Compute => Self {
                enabled: true,
                exclude_types: vec!["t2.nano".to_string(), "t3.nano".to_string()],
                thresholds: thresholds(&[("cpu_threshold", 5.0)]),
                ..base
            },
            ResourceKind::Database => Self {
                enabled: true,
                minimum_age_days: Some(7),
                thresholds: thresholds(&[("cpu_threshold", 10.0), ("connection_threshold", 5.0)]),
                ..base
            },
            ResourceKind::BlockStorage => Self {
                enabled: true,
                days_to_check: 7,
                include_types: ["gp2", "gp3", "io1", "io2"].iter().map(|s| s.to_string()).collect(),
                thresholds: thresholds(&[("iops_threshold", 1.0)]),
                ..base
            },
            ResourceKind::LoadBalancer => Self {
                thresholds: thresholds(&[("request_threshold", 10.0)]),
                ..base
            },
            ResourceKind::Function => Self {
                thresholds: thresholds(&[("invocation_threshold", 1.0)]),
                ..base
            },
        }
    }

    pub fn threshold(&self, key: &str, fallback: f64) -> f64 {
        self.thresholds.get(key).copied().unwrap_or(fallback)
    }

    pub fn is_tag_excluded(&self, tags: &BTreeMap<String, String>) -> bool {
        self.exclude_tags.iter().any(|m| m.matches(tags))
    }

    pub fn is_type_excluded(&self, resource_type: &str) -> bool {
        if self.exclude_types.iter().any(|t| t == resource_type) {
            return true;
        }
        !self.include_types.is_empty() && !self.include_types.iter().any(|t| t == resource_type)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateUnit {
    /// Cost of one resource for a month.
    #[default]
    Resource,
    /// Cost per provisioned GB for a month, multiplied by `size_gb`.
    Gb,
}

/// One rate-table row keyed by `(region, kind, size)`; `region: "*"`
/// matches any region.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RateEntry {
    pub region: String,
    pub kind: ResourceKind,
    pub size: String,
    pub monthly_cost: f64,
    #[serde(default)]
    pub unit: RateUnit,
}
