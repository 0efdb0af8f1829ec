use tracing::debug;

/// Resolve a credential value. If the value starts with '$', treat it as an
/// environment variable reference. Returns `None` when the variable is unset
/// or the value is empty.
pub fn resolve_credential(value: &str) -> Option<String> {
    let resolved = if let Some(var_name) = value.strip_prefix('$') {
        match std::env::var(var_name) {
            Ok(resolved) => {
                debug!(var = %var_name, "Resolved credential from environment");
                resolved
            }
            Err(_) => {
                debug!(var = %var_name, "Environment variable not set");
                return None;
            }
        }
    } else {
        value.to_string()
    };
    if resolved.trim().is_empty() {
        None
    } else {
        Some(resolved)
    }
}

/// Redact sensitive values in a string. Replaces known credential patterns
/// with [REDACTED].
pub fn redact_credentials(text: &str, secrets: &[&str]) -> String {
    let mut result = text.to_string();
    for secret in secrets {
        if !secret.is_empty() && secret.len() >= 4 {
            result = result.replace(secret, "[REDACTED]");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_credential_literal() {
        assert_eq!(resolve_credential("AKIAEXAMPLE").as_deref(), Some("AKIAEXAMPLE"));
    }

    #[test]
    fn test_resolve_credential_env_var() {
        std::env::set_var("TEST_IDLESCAN_CRED", "secret123");
        assert_eq!(resolve_credential("$TEST_IDLESCAN_CRED").as_deref(), Some("secret123"));
        std::env::remove_var("TEST_IDLESCAN_CRED");
    }

    #[test]
    fn test_resolve_credential_missing_env_var() {
        assert!(resolve_credential("$NONEXISTENT_IDLESCAN_VAR").is_none());
    }

    #[test]
    fn test_resolve_credential_blank() {
        assert!(resolve_credential("  ").is_none());
    }

    #[test]
    fn test_redact_credentials() {
        let text = "assume-role failed for key S3cret123 token=abc";
        let redacted = redact_credentials(text, &["S3cret123", "abc"]);
        assert!(redacted.contains("[REDACTED]"));
        assert!(!redacted.contains("S3cret123"));
        assert!(redacted.contains("abc")); // too short to redact
    }
}
