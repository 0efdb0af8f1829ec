use super::types::IdlescanError;
use crate::models::scan_result::ScanErrorKind;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    pub retryable: bool,
    /// How this error is reported when it ends a scan target.
    pub scan_kind: ScanErrorKind,
}

impl IdlescanError {
    /// Classify this error to determine its type and whether it can be retried.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Retryable errors
            IdlescanError::Throttled(_) => ErrorClassification {
                error_type: "ThrottledError",
                retryable: true,
                scan_kind: ScanErrorKind::Throttled,
            },
            IdlescanError::Network(_) => ErrorClassification {
                error_type: "NetworkError",
                retryable: true,
                scan_kind: ScanErrorKind::Unknown,
            },

            // Non-retryable errors
            IdlescanError::Auth(_) => ErrorClassification {
                error_type: "AuthError",
                retryable: false,
                scan_kind: ScanErrorKind::Denied,
            },
            IdlescanError::Permission(_) => ErrorClassification {
                error_type: "PermissionError",
                retryable: false,
                scan_kind: ScanErrorKind::Denied,
            },
            IdlescanError::NotFound(_) => ErrorClassification {
                error_type: "NotFoundError",
                retryable: false,
                scan_kind: ScanErrorKind::Unknown,
            },
            IdlescanError::Timeout(_) => ErrorClassification {
                error_type: "TimeoutError",
                retryable: false,
                scan_kind: ScanErrorKind::Timeout,
            },
            IdlescanError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                retryable: false,
                scan_kind: ScanErrorKind::Unknown,
            },
            IdlescanError::Io(_) => ErrorClassification {
                error_type: "IoError",
                retryable: false,
                scan_kind: ScanErrorKind::Unknown,
            },
            IdlescanError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                retryable: false,
                scan_kind: ScanErrorKind::Unknown,
            },
            IdlescanError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                retryable: false,
                scan_kind: ScanErrorKind::Unknown,
            },
            IdlescanError::Internal(_) => ErrorClassification {
                error_type: "InternalError",
                retryable: false,
                scan_kind: ScanErrorKind::Unknown,
            },
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classify().retryable
    }
}
