//! Bounded retry for commands that lost a lock race

use std::future::Future;
use std::time::Duration;

use crate::config::LedgerConfig;
use crate::error::AppResult;

/// Run `op`, retrying while it fails with a busy error.
///
/// Each retry waits `busy_backoff_ms * attempt`. Only busy errors are
/// retried; the last busy error is returned once retries run out.
pub async fn with_busy_retry<T, F, Fut>(config: &LedgerConfig, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() && attempt < config.busy_retries => {
                attempt += 1;
                tracing::warn!(attempt, error = %err, "Busy, retrying");
                let backoff = config.busy_backoff_ms.saturating_mul(u64::from(attempt));
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(retries: u32) -> LedgerConfig {
        LedgerConfig {
            lock_timeout_ms: 10,
            busy_retries: retries,
            busy_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = with_busy_retry(&fast_config(3), move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(AppError::Busy("locked".to_string()))
            } else {
                Ok(7)
            }
        })
        .await;

        let value = tokio_test::assert_ok!(result);
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = with_busy_retry(&fast_config(2), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Busy("locked".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::Busy(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: AppResult<()> = with_busy_retry(&fast_config(5), move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(AppError::NotFound("Order".to_string()))
        })
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
