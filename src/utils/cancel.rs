use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::IdlescanError;

/// Run `fut` unless `token` fires first, in which case the wait is abandoned
/// and reported as a timeout for `what`.
pub async fn cancellable<F, T>(
    token: &CancellationToken,
    what: &str,
    fut: F,
) -> Result<T, IdlescanError>
where
    F: Future<Output = Result<T, IdlescanError>>,
{
    if token.is_cancelled() {
        return Err(cancelled(what));
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(cancelled(what)),
        result = fut => result,
    }
}

/// Sleep for `delay`, aborting early with a timeout if `token` fires.
pub async fn sleep_or_cancel(
    token: &CancellationToken,
    what: &str,
    delay: Duration,
) -> Result<(), IdlescanError> {
    cancellable(token, what, async {
        tokio::time::sleep(delay).await;
        Ok(())
    })
    .await
}

fn cancelled(what: &str) -> IdlescanError {
    IdlescanError::Timeout(format!("{} cancelled: scan cycle deadline reached", what))
}
