use std::collections::HashSet;
use std::path::Path;

use tracing::warn;

use crate::errors::IdlescanError;
use crate::models::ResourceKind;
use super::schema::CONFIG_SCHEMA;
use super::types::{CredentialSourceKind, ScanConfig};

const MAX_DAYS_TO_CHECK: u32 = 90;

pub async fn parse_config(path: &Path) -> Result<ScanConfig, IdlescanError> {
    if !path.exists() {
        return Err(IdlescanError::Config(format!("Config file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > 1_048_576 {
        return Err(IdlescanError::Config("Config file exceeds 1MB limit".into()));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse, schema-check, clamp and validate a YAML configuration document.
pub fn parse_config_str(content: &str) -> Result<ScanConfig, IdlescanError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)
        .map_err(|e| IdlescanError::Config(format!("Invalid YAML: {}", e)))?;

    validate_schema(&yaml)?;

    let mut config: ScanConfig = serde_yaml::from_value(yaml)
        .map_err(|e| IdlescanError::Config(format!("Invalid configuration: {}", e)))?;

    clamp_thresholds(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Validate config against the JSON schema for structural correctness.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), IdlescanError> {
    let json_value = serde_json::to_value(yaml)
        .map_err(|e| IdlescanError::Config(format!("Config conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&CONFIG_SCHEMA)
        .map_err(|e| IdlescanError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        let messages: Vec<String> = errors
            .map(|e| format!("{} at {}", e, e.instance_path))
            .collect();
        if !messages.is_empty() {
            return Err(IdlescanError::Config(format!(
                "Schema validation failed: {}",
                messages.join("; ")
            )));
        }
    }

    Ok(())
}

/// Pull out-of-range values back into range, as operators tend to write
/// `days_to_check: 365` meaning "as much as possible".
fn clamp_thresholds(config: &mut ScanConfig) {
    for (kind, section) in config.scanners.iter_mut() {
        if let Some(days) = section.days_to_check {
            if days > MAX_DAYS_TO_CHECK {
                warn!(kind = %kind, days, "days_to_check > 90, setting to 90");
                section.days_to_check = Some(MAX_DAYS_TO_CHECK);
            } else if days < 1 {
                warn!(kind = %kind, days, "days_to_check < 1, setting to 1");
                section.days_to_check = Some(1);
            }
        }
        for (key, value) in section.thresholds.iter_mut() {
            if key.starts_with("cpu") && *value > 100.0 {
                warn!(kind = %kind, threshold = %key, "CPU threshold > 100%, setting to 100%");
                *value = 100.0;
            }
        }
    }
}

/// Semantic validation that the schema cannot express. Runs before any scan
/// target is built; every failure is a `Config` error.
pub fn validate_config(config: &ScanConfig) -> Result<(), IdlescanError> {
    if config.accounts.is_empty() {
        return Err(IdlescanError::Config("At least one account must be configured".into()));
    }

    let mut seen = HashSet::new();
    for account in &config.accounts {
        if account.account_id.trim().is_empty() {
            return Err(IdlescanError::Config("Account with empty account_id".into()));
        }
        if !seen.insert(account.account_id.as_str()) {
            return Err(IdlescanError::Config(format!(
                "Duplicate account_id: {}",
                account.account_id
            )));
        }
        if account.regions.is_empty() || account.regions.iter().any(|r| r.trim().is_empty()) {
            return Err(IdlescanError::Config(format!(
                "Account {} must list at least one non-empty region",
                account.account_id
            )));
        }
        if config.credentials.source == CredentialSourceKind::AssumeRole
            && account.role_name.as_deref().map_or(true, |r| r.trim().is_empty())
        {
            return Err(IdlescanError::Config(format!(
                "Account {} needs role_name when credentials.source is assume-role",
                account.account_id
            )));
        }
    }

    let exec = &config.scan;
    if exec.concurrency == 0 {
        return Err(IdlescanError::Config("scan.concurrency must be at least 1".into()));
    }
    if exec.timeout_secs == 0 {
        return Err(IdlescanError::Config("scan.timeout_secs must be at least 1".into()));
    }
    if exec.max_attempts == 0 {
        return Err(IdlescanError::Config("scan.max_attempts must be at least 1".into()));
    }
    if exec.base_delay_ms > exec.max_delay_ms {
        return Err(IdlescanError::Config(
            "scan.base_delay_ms must not exceed scan.max_delay_ms".into(),
        ));
    }
    if exec.metric_period_secs == 0 {
        return Err(IdlescanError::Config("scan.metric_period_secs must be positive".into()));
    }

    let enabled = config.enabled_kinds();
    if enabled.is_empty() {
        return Err(IdlescanError::Config("No scanner kinds are enabled".into()));
    }
    for kind in enabled {
        validate_kind(config, kind)?;
    }

    for rate in &config.rates {
        if !rate.monthly_cost.is_finite() || rate.monthly_cost < 0.0 {
            return Err(IdlescanError::Config(format!(
                "Rate for {}/{}/{} must be a non-negative number",
                rate.region, rate.kind, rate.size
            )));
        }
    }

    Ok(())
}

fn validate_kind(config: &ScanConfig, kind: ResourceKind) -> Result<(), IdlescanError> {
    let resolved = config.kind_config(kind);
    if resolved.days_to_check == 0 || resolved.days_to_check > MAX_DAYS_TO_CHECK {
        return Err(IdlescanError::Config(format!(
            "{}: days_to_check must be within 1..=90",
            kind
        )));
    }
    for (key, value) in &resolved.thresholds {
        if !value.is_finite() {
            return Err(IdlescanError::Config(format!("{}: {} is not a number", kind, key)));
        }
    }
    for rule in &resolved.rules {
        let id = rule.id();
        if rule.metric_name.trim().is_empty() {
            return Err(IdlescanError::Config(format!("{}: rule with empty metric_name", kind)));
        }
        if !rule.limit.is_finite() {
            return Err(IdlescanError::Config(format!("{}: rule {} has a non-finite limit", kind, id)));
        }
        if !(0.0..=1.0).contains(&rule.required_sample_coverage) {
            return Err(IdlescanError::Config(format!(
                "{}: rule {} required_sample_coverage must be within 0..=1",
                kind, id
            )));
        }
        if !(0.0..=1.0).contains(&rule.savings_ratio) {
            return Err(IdlescanError::Config(format!(
                "{}: rule {} savings_ratio must be within 0..=1",
                kind, id
            )));
        }
        if let Some(days) = rule.evaluation_window_days {
            if days == 0 || days > MAX_DAYS_TO_CHECK {
                return Err(IdlescanError::Config(format!(
                    "{}: rule {} evaluation_window_days must be within 1..={}",
                    kind, id, MAX_DAYS_TO_CHECK
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
accounts:
  - account_id: "111111111111"
    regions: [us-east-1]
"#;

    #[test]
    fn test_minimal_config_parses_with_defaults() {
        let config = parse_config_str(MINIMAL).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert_eq!(config.scan.concurrency, 8);
        assert_eq!(config.enabled_kinds().len(), 3);
    }

    #[test]
    fn test_missing_accounts_rejected_by_schema() {
        let err = parse_config_str("scan:\n  concurrency: 2\n").unwrap_err();
        assert!(matches!(err, IdlescanError::Config(_)));
    }

    #[test]
    fn test_unknown_scanner_kind_rejected() {
        let yaml = format!("{}scanners:\n  queue:\n    enabled: true\n", MINIMAL);
        assert!(matches!(parse_config_str(&yaml), Err(IdlescanError::Config(_))));
    }

    #[test]
    fn test_bad_comparison_rejected() {
        let yaml = format!(
            "{}scanners:\n  compute:\n    rules:\n      - metric_name: CPUUtilization\n        comparison: sideways\n        limit: 5\n",
            MINIMAL
        );
        assert!(matches!(parse_config_str(&yaml), Err(IdlescanError::Config(_))));
    }

    #[test]
    fn test_days_to_check_clamped() {
        let yaml = format!("{}scanners:\n  compute:\n    days_to_check: 365\n    cpu_threshold: 250\n", MINIMAL);
        let config = parse_config_str(&yaml).unwrap();
        let compute = config.kind_config(ResourceKind::Compute);
        assert_eq!(compute.days_to_check, 90);
        assert_eq!(compute.threshold("cpu_threshold", 0.0), 100.0);
    }

    #[test]
    fn test_duplicate_accounts_rejected() {
        let yaml = r#"
accounts:
  - account_id: "111111111111"
    regions: [us-east-1]
  - account_id: "111111111111"
    regions: [eu-west-1]
"#;
        let err = parse_config_str(yaml).unwrap_err();
        assert!(err.to_string().contains("Duplicate account_id"));
    }

    #[test]
    fn test_assume_role_requires_role_name() {
        let yaml = format!("{}credentials:\n  source: assume-role\n", MINIMAL);
        let err = parse_config_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("role_name"));
    }

    #[test]
    fn test_all_kinds_disabled_rejected() {
        let yaml = format!(
            "{}scanners:\n  compute: {{ enabled: false }}\n  database: {{ enabled: false }}\n  block-storage: {{ enabled: false }}\n",
            MINIMAL
        );
        let err = parse_config_str(&yaml).unwrap_err();
        assert!(err.to_string().contains("No scanner kinds"));
    }

    #[test]
    fn test_oversized_rule_window_rejected_after_parse() {
        use crate::config::KindSection;
        use crate::models::{Comparison, ThresholdRule};

        let mut config = parse_config_str(MINIMAL).unwrap();
        let mut rule = ThresholdRule::new("low_cpu", "CPUUtilization", Comparison::Below, 5.0);
        rule.evaluation_window_days = Some(u32::MAX);
        config.scanners.insert(
            ResourceKind::Compute,
            KindSection { rules: Some(vec![rule]), ..KindSection::default() },
        );

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, IdlescanError::Config(_)));
        assert!(err.to_string().contains("evaluation_window_days"));
    }

    #[tokio::test]
    async fn test_parse_config_missing_file() {
        let err = parse_config(Path::new("/nonexistent/idlescan.yaml")).await.unwrap_err();
        assert!(matches!(err, IdlescanError::Config(_)));
    }
}
