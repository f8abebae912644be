//! Timeout and backoff around storage backend calls

use crate::storage::StorageError;
use crate::RetryConfig;
use std::future::Future;

/// Run `call` up to `storage_attempts` times with a per-call timeout
///
/// Waits `storage_backoff(attempt)` between attempts. Returns the last error
/// once the budget is spent. `Rejected` is not retried: the backend answered.
pub async fn with_storage_retry<F, Fut>(
    config: &RetryConfig,
    operation: &str,
    mut call: F,
) -> Result<(), StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StorageError>>,
{
    let attempts = config.storage_attempts.max(1);
    let timeout = config.storage_timeout();
    let mut last_error = StorageError::Unavailable("no attempt made".to_string());

    for attempt in 1..=attempts {
        let result = match tokio::time::timeout(timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(StorageError::Timeout(timeout)),
        };

        match result {
            Ok(()) => return Ok(()),
            Err(err @ StorageError::Rejected(_)) => return Err(err),
            Err(err) => {
                tracing::warn!(
                    "Storage {} failed (attempt {}/{}): {}",
                    operation,
                    attempt,
                    attempts,
                    err
                );
                last_error = err;
            }
        }

        if attempt < attempts {
            tokio::time::sleep(config.storage_backoff(attempt)).await;
        }
    }

    Err(last_error)
}
