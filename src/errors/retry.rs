use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::types::IdlescanError;
use crate::utils::cancel::{cancellable, sleep_or_cancel};

/// Exponential backoff for remote calls that may be throttled.
///
/// The delay before retry `n` (0-indexed) is `base_delay * 2^n` plus up to
/// one `base_delay` of random jitter, never more than `max_delay`.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Total attempts including the first call.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(24));
        let exponential = self.base_delay.saturating_mul(factor).min(self.max_delay);
        let jitter = if self.jitter {
            self.base_delay.mul_f64(rand::random::<f64>())
        } else {
            Duration::ZERO
        };
        (exponential + jitter).min(self.max_delay)
    }
}

/// Execute an async remote call with bounded exponential backoff.
///
/// Non-retryable errors surface immediately. A throttled call that is still
/// throttled on the final attempt surfaces as `Throttled`. Cancellation of
/// `cancel` aborts both the in-flight call and any backoff sleep with
/// `Timeout`.
pub async fn with_backoff<F, Fut, T>(
    operation_name: &str,
    policy: &BackoffPolicy,
    cancel: &CancellationToken,
    mut factory: F,
) -> Result<T, IdlescanError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, IdlescanError>>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        let err = match cancellable(cancel, operation_name, factory()).await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let classification = err.classify();
        if !classification.retryable {
            debug!(
                operation = operation_name,
                error_type = classification.error_type,
                "Non-retryable error, failing immediately"
            );
            return Err(err);
        }

        if attempt + 1 >= max_attempts {
            warn!(
                operation = operation_name,
                attempts = max_attempts,
                error = %err,
                "Max attempts exhausted"
            );
            return Err(match err {
                IdlescanError::Throttled(msg) => IdlescanError::Throttled(format!(
                    "{}: still throttled after {} attempts ({})",
                    operation_name, max_attempts, msg
                )),
                other => other,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max = max_attempts,
            error_type = classification.error_type,
            delay_ms = delay.as_millis() as u64,
            "Retrying after error"
        );
        sleep_or_cancel(cancel, operation_name, delay).await?;
    }

    Err(IdlescanError::Internal("Backoff loop exited unexpectedly".into()))
}
