use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::StorageError;

/// Maximum attempts for a retryable request, matching the source client's
/// fixed budget (one initial attempt plus two retries).
pub const MAX_ATTEMPTS: u32 = 3;

/// Retries `op` up to [`MAX_ATTEMPTS`] times total, but only while the
/// returned error is [`StorageError::is_retryable`]. Non-idempotent requests
/// with a non-replayable body must not be passed through this helper; the
/// caller is responsible for only retrying the idempotent operations named
/// in the object-store client contract (HEAD, GET, DELETE, and part PUTs).
pub async fn retry_idempotent<F, Fut, T>(operation: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                warn!(operation, attempt, error = %e, "retrying after transient error");
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(100 * (1 << attempt.min(4)))
}
