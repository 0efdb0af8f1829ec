use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::credentials::{redact_credentials, resolve_credential};
use crate::config::{CredentialSourceKind, CredentialsConfig, ScanConfig};
use crate::errors::IdlescanError;
use crate::utils::cancel::cancellable;
use super::handle::{Handle, SessionCredentials};

pub const DEFAULT_EMULATED_ENDPOINT: &str = "http://localhost:4566";

/// Temporary credentials returned by a role assumption.
#[derive(Debug, Clone)]
pub struct AssumedRole {
    pub credentials: SessionCredentials,
    pub expires_at: DateTime<Utc>,
}

/// Performs the remote cross-account role assumption.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        base: &SessionCredentials,
        role_arn: &str,
        region: &str,
        duration: Duration,
    ) -> Result<AssumedRole, IdlescanError>;
}

pub fn role_arn(account_id: &str, role_name: &str) -> String {
    format!("arn:aws:iam::{}:role/{}", account_id, role_name)
}

type SessionSlot = Arc<Mutex<Option<Handle>>>;

/// Resolves and caches one handle per (account, region).
///
/// Resolution is lazy: a cached handle is returned until it comes within the
/// refresh margin of its expiry, after which the next caller re-resolves it.
/// Concurrent callers for the same pair wait on one resolution. Failures are
/// not cached.
pub struct SessionProvider {
    credentials: CredentialsConfig,
    roles: HashMap<String, String>,
    assumer: Option<Arc<dyn RoleAssumer>>,
    sessions: DashMap<(String, String), SessionSlot>,
}

impl SessionProvider {
    pub fn new(config: &ScanConfig) -> Self {
        let roles = config
            .accounts
            .iter()
            .filter_map(|a| a.role_name.as_ref().map(|r| (a.account_id.clone(), r.clone())))
            .collect();
        Self {
            credentials: config.credentials.clone(),
            roles,
            assumer: None,
            sessions: DashMap::new(),
        }
    }

    pub fn with_role_assumer(mut self, assumer: Arc<dyn RoleAssumer>) -> Self {
        self.assumer = Some(assumer);
        self
    }

    pub async fn resolve(
        &self,
        account_id: &str,
        region: &str,
        cancel: &CancellationToken,
    ) -> Result<Handle, IdlescanError> {
        let slot = self
            .sessions
            .entry((account_id.to_string(), region.to_string()))
            .or_default()
            .clone();

        let mut cached = cancellable(cancel, "session lock", async { Ok(slot.lock().await) }).await?;
        let now = Utc::now();
        if let Some(handle) = cached.as_ref() {
            if !handle.needs_refresh(now, self.credentials.refresh_margin()) {
                return Ok(handle.clone());
            }
            debug!(account = %account_id, region = %region, "Session near expiry, re-resolving");
        }

        let handle = cancellable(cancel, "credential resolution", self.acquire(account_id, region)).await?;
        info!(
            account = %account_id,
            region = %region,
            origin = handle.origin.as_str(),
            "Session resolved"
        );
        *cached = Some(handle.clone());
        Ok(handle)
    }

    async fn acquire(&self, account_id: &str, region: &str) -> Result<Handle, IdlescanError> {
        let now = Utc::now();
        match self.credentials.source {
            CredentialSourceKind::Default => {
                let credentials = self.default_credentials().await?;
                Ok(Handle {
                    account_id: account_id.to_string(),
                    region: region.to_string(),
                    origin: CredentialSourceKind::Default,
                    credentials,
                    endpoint: None,
                    issued_at: now,
                    expires_at: None,
                })
            }
            CredentialSourceKind::AssumeRole => {
                let role_name = self.roles.get(account_id).ok_or_else(|| {
                    IdlescanError::Auth(format!("No role_name configured for account {}", account_id))
                })?;
                let assumer = self.assumer.as_ref().ok_or_else(|| {
                    IdlescanError::Auth("Role assumption is not available in this runtime".into())
                })?;
                let base = self.default_credentials().await?;
                let arn = role_arn(account_id, role_name);
                let assumed = assumer
                    .assume_role(&base, &arn, region, self.credentials.session_duration())
                    .await
                    .map_err(|e| match e {
                        IdlescanError::Permission(msg) | IdlescanError::Auth(msg) => IdlescanError::Auth(
                            redact_credentials(
                                &format!("Failed to assume {}: {}", arn, msg),
                                &[base.secret_access_key.as_str()],
                            ),
                        ),
                        other => other,
                    })?;
                Ok(Handle {
                    account_id: account_id.to_string(),
                    region: region.to_string(),
                    origin: CredentialSourceKind::AssumeRole,
                    credentials: assumed.credentials,
                    endpoint: None,
                    issued_at: now,
                    expires_at: Some(assumed.expires_at),
                })
            }
            CredentialSourceKind::Emulated => {
                let credentials = self
                    .configured_keys()
                    .unwrap_or_else(|| SessionCredentials::new("test", "test"));
                Ok(Handle {
                    account_id: account_id.to_string(),
                    region: region.to_string(),
                    origin: CredentialSourceKind::Emulated,
                    credentials,
                    endpoint: Some(
                        self.credentials
                            .endpoint
                            .clone()
                            .unwrap_or_else(|| DEFAULT_EMULATED_ENDPOINT.to_string()),
                    ),
                    issued_at: now,
                    expires_at: None,
                })
            }
        }
    }

    fn configured_keys(&self) -> Option<SessionCredentials> {
        let key_id = self.credentials.access_key_id.as_deref().and_then(resolve_credential)?;
        let secret = self.credentials.secret_access_key.as_deref().and_then(resolve_credential)?;
        let mut credentials = SessionCredentials::new(&key_id, &secret);
        credentials.session_token = self.credentials.session_token.as_deref().and_then(resolve_credential);
        Some(credentials)
    }

    /// Default chain: keys in the config file, then the standard environment
    /// variables, then the shared credentials file profile.
    async fn default_credentials(&self) -> Result<SessionCredentials, IdlescanError> {
        if let Some(credentials) = self.configured_keys() {
            return Ok(credentials);
        }

        if let (Some(key_id), Some(secret)) = (
            resolve_credential("$AWS_ACCESS_KEY_ID"),
            resolve_credential("$AWS_SECRET_ACCESS_KEY"),
        ) {
            let mut credentials = SessionCredentials::new(&key_id, &secret);
            credentials.session_token = resolve_credential("$AWS_SESSION_TOKEN");
            return Ok(credentials);
        }

        let profile = self
            .credentials
            .profile
            .clone()
            .or_else(|| resolve_credential("$AWS_PROFILE"))
            .unwrap_or_else(|| "default".to_string());
        if let Some(path) = shared_credentials_path() {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    if let Some(credentials) = parse_profile(&content, &profile) {
                        return Ok(credentials);
                    }
                }
                Err(e) => debug!(path = %path.display(), error = %e, "Shared credentials file unreadable"),
            }
        }

        warn!(profile = %profile, "No usable credentials found");
        Err(IdlescanError::Auth(format!(
            "No usable credentials: config keys, environment and profile '{}' all missing",
            profile
        )))
    }
}

fn shared_credentials_path() -> Option<PathBuf> {
    credentials_path_from(resolve_credential("$AWS_SHARED_CREDENTIALS_FILE"), dirs::home_dir())
}

/// An explicit file wins; otherwise `~/.aws/credentials`.
fn credentials_path_from(explicit: Option<String>, home: Option<PathBuf>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(PathBuf::from(path)),
        None => home.map(|h| h.join(".aws").join("credentials")),
    }
}

/// Read one `[profile]` section of an INI-style shared credentials file.
fn parse_profile(content: &str, profile: &str) -> Option<SessionCredentials> {
    let mut in_section = false;
    let mut values: HashMap<&str, &str> = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            if in_section {
                break;
            }
            in_section = name.trim() == profile;
            continue;
        }
        if in_section {
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim(), value.trim());
            }
        }
    }
    let key_id = values.get("aws_access_key_id").filter(|v| !v.is_empty())?;
    let secret = values.get("aws_secret_access_key").filter(|v| !v.is_empty())?;
    let mut credentials = SessionCredentials::new(key_id, secret);
    credentials.session_token = values.get("aws_session_token").map(|t| t.to_string());
    Some(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccountConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingAssumer {
        calls: AtomicUsize,
        lifetime: chrono::Duration,
        deny: bool,
    }

    #[async_trait]
    impl RoleAssumer for CountingAssumer {
        async fn assume_role(
            &self,
            _base: &SessionCredentials,
            role_arn: &str,
            _region: &str,
            _duration: Duration,
        ) -> Result<AssumedRole, IdlescanError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.deny {
                return Err(IdlescanError::Permission(format!("not authorized to assume {}", role_arn)));
            }
            Ok(AssumedRole {
                credentials: SessionCredentials::new(&format!("ASIA{}", n), "temp").with_session_token("t"),
                expires_at: Utc::now() + self.lifetime,
            })
        }
    }

    fn assume_role_config() -> ScanConfig {
        let mut config = ScanConfig {
            accounts: vec![AccountConfig {
                account_id: "222222222222".into(),
                role_name: Some("IdleScanReadOnly".into()),
                regions: vec!["us-east-1".into()],
            }],
            ..Default::default()
        };
        config.credentials.source = CredentialSourceKind::AssumeRole;
        config.credentials.access_key_id = Some("AKIABASE".into());
        config.credentials.secret_access_key = Some("base-secret".into());
        config
    }

    fn assumer(lifetime: chrono::Duration, deny: bool) -> Arc<CountingAssumer> {
        Arc::new(CountingAssumer { calls: AtomicUsize::new(0), lifetime, deny })
    }

    #[tokio::test]
    async fn test_handle_cached_within_lifetime() {
        let roles = assumer(chrono::Duration::hours(1), false);
        let provider = SessionProvider::new(&assume_role_config()).with_role_assumer(roles.clone());
        let cancel = CancellationToken::new();

        let first = provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap();
        let second = provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap();
        assert_eq!(first.credentials, second.credentials);
        assert_eq!(roles.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.origin, CredentialSourceKind::AssumeRole);
    }

    #[tokio::test]
    async fn test_handle_inside_margin_is_re_resolved() {
        // Sessions shorter than the refresh margin are stale on arrival.
        let roles = assumer(chrono::Duration::seconds(60), false);
        let provider = SessionProvider::new(&assume_role_config()).with_role_assumer(roles.clone());
        let cancel = CancellationToken::new();

        provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap();
        let second = provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap();
        assert_eq!(roles.calls.load(Ordering::SeqCst), 2);
        assert_eq!(second.credentials.access_key_id, "ASIA1");
    }

    #[tokio::test]
    async fn test_regions_cached_separately() {
        let roles = assumer(chrono::Duration::hours(1), false);
        let provider = SessionProvider::new(&assume_role_config()).with_role_assumer(roles.clone());
        let cancel = CancellationToken::new();

        provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap();
        provider.resolve("222222222222", "eu-west-1", &cancel).await.unwrap();
        assert_eq!(roles.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_denied_assumption_is_auth_error() {
        let roles = assumer(chrono::Duration::hours(1), true);
        let provider = SessionProvider::new(&assume_role_config()).with_role_assumer(roles.clone());
        let cancel = CancellationToken::new();

        let err = provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap_err();
        assert!(matches!(err, IdlescanError::Auth(_)));
        assert!(err.to_string().contains("IdleScanReadOnly"));

        // Failures are not cached.
        let _ = provider.resolve("222222222222", "us-east-1", &cancel).await;
        assert_eq!(roles.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_assumer_is_auth_error() {
        let provider = SessionProvider::new(&assume_role_config());
        let err = provider
            .resolve("222222222222", "us-east-1", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IdlescanError::Auth(_)));
    }

    #[tokio::test]
    async fn test_emulated_origin_uses_endpoint() {
        let mut config = assume_role_config();
        config.credentials.source = CredentialSourceKind::Emulated;
        config.credentials.access_key_id = None;
        let provider = SessionProvider::new(&config);

        let handle = provider
            .resolve("222222222222", "us-east-1", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(handle.origin, CredentialSourceKind::Emulated);
        assert_eq!(handle.endpoint.as_deref(), Some(DEFAULT_EMULATED_ENDPOINT));
        assert_eq!(handle.credentials.access_key_id, "test");
        assert!(handle.expires_at.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_resolution_times_out() {
        let provider = SessionProvider::new(&assume_role_config());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = provider.resolve("222222222222", "us-east-1", &cancel).await.unwrap_err();
        assert!(matches!(err, IdlescanError::Timeout(_)));
    }

    #[test]
    fn test_parse_profile_section() {
        let ini = "[default]\naws_access_key_id = AKIADEFAULT\naws_secret_access_key = s1\n\n\
                   [audit]\naws_access_key_id=AKIAAUDIT\naws_secret_access_key=s2\naws_session_token=tok\n";
        let audit = parse_profile(ini, "audit").unwrap();
        assert_eq!(audit.access_key_id, "AKIAAUDIT");
        assert_eq!(audit.session_token.as_deref(), Some("tok"));
        assert_eq!(parse_profile(ini, "default").unwrap().secret_access_key, "s1");
        assert!(parse_profile(ini, "missing").is_none());
    }

    #[test]
    fn test_credentials_path_prefers_explicit_file() {
        let home = Some(PathBuf::from("/home/scanner"));
        assert_eq!(
            credentials_path_from(Some("/etc/idlescan/creds".into()), home.clone()),
            Some(PathBuf::from("/etc/idlescan/creds"))
        );
        assert_eq!(
            credentials_path_from(None, home),
            Some(PathBuf::from("/home/scanner/.aws/credentials"))
        );
        assert_eq!(credentials_path_from(None, None), None);
    }

    #[test]
    fn test_shared_credentials_path_without_override_uses_home_dir() {
        if std::env::var_os("AWS_SHARED_CREDENTIALS_FILE").is_some() {
            return;
        }
        let expected = dirs::home_dir().map(|h| h.join(".aws").join("credentials"));
        assert_eq!(shared_credentials_path(), expected);
    }
}
