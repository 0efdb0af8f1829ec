use chrono::{DateTime, Duration, Utc};

use crate::config::CredentialSourceKind;

/// Key material behind a handle. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl SessionCredentials {
    pub fn new(access_key_id: &str, secret_access_key: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            secret_access_key: secret_access_key.to_string(),
            session_token: None,
        }
    }

    pub fn with_session_token(mut self, token: impl Into<String>) -> Self {
        self.session_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for SessionCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .field("session_token", &self.session_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Authorization to call remote APIs in one account and region.
#[derive(Debug, Clone)]
pub struct Handle {
    pub account_id: String,
    pub region: String,
    pub origin: CredentialSourceKind,
    pub credentials: SessionCredentials,
    /// Override endpoint, set for emulated sessions.
    pub endpoint: Option<String>,
    pub issued_at: DateTime<Utc>,
    /// `None` for long-lived credentials that never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Handle {
    /// True once `now` is within `margin` of expiry. Long-lived handles
    /// never need a refresh.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: std::time::Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                let margin = Duration::from_std(margin).unwrap_or_else(|_| Duration::zero());
                now + margin >= expires_at
            }
            None => false,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expires_at| now >= expires_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(expires_at: Option<DateTime<Utc>>) -> Handle {
        Handle {
            account_id: "111111111111".into(),
            region: "us-east-1".into(),
            origin: CredentialSourceKind::AssumeRole,
            credentials: SessionCredentials::new("ASIAEXAMPLE", "wJalrXUtnFEMI").with_session_token("FwoGZXIvYXdzEBY"),
            endpoint: None,
            issued_at: Utc::now(),
            expires_at,
        }
    }

    #[test]
    fn test_refresh_inside_margin() {
        let now = Utc::now();
        let margin = std::time::Duration::from_secs(300);
        assert!(!handle(Some(now + Duration::minutes(30))).needs_refresh(now, margin));
        assert!(handle(Some(now + Duration::minutes(4))).needs_refresh(now, margin));
        assert!(handle(Some(now - Duration::minutes(1))).needs_refresh(now, margin));
    }

    #[test]
    fn test_static_handle_never_refreshes() {
        let h = handle(None);
        assert!(!h.needs_refresh(Utc::now() + Duration::days(365), std::time::Duration::from_secs(300)));
        assert!(!h.is_expired(Utc::now()));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", handle(None));
        assert!(rendered.contains("ASIAEXAMPLE"));
        assert!(!rendered.contains("wJalrXUtnFEMI"));
        assert!(!rendered.contains("FwoGZXIvYXdzEBY"));
    }
}
