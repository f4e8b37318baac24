//! Retry-on-lock wrapper for SERIALIZABLE-equivalent writes (§4.8, §5)
//!
//! SQLite reports contention as `SQLITE_BUSY`/`database is locked` rather
//! than a SERIALIZABLE conflict, but the retry contract is the same one
//! §5 asks for: back off and retry a bounded number of times before
//! giving up.

use std::time::Duration;
use tokio::time::sleep;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 20;

fn is_lock_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let message = db_err.message();
            message.contains("database is locked") || message.contains("busy")
        }
        _ => false,
    }
}

/// Run `f` up to `MAX_ATTEMPTS` times, applying exponential backoff whenever
/// the failure looks like lock contention. Any other error, or contention
/// that persists past the attempt budget, is returned immediately.
pub async fn retry_on_lock<T, F, Fut>(mut f: F) -> sodav_common::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = sodav_common::Result<T>>,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(sodav_common::Error::Database(db_err)) if is_lock_error(&db_err) && attempt + 1 < MAX_ATTEMPTS => {
                let delay = Duration::from_millis(BASE_DELAY_MS * 2u64.pow(attempt));
                tracing::warn!(category = "STATS_RECORDER", attempt, ?delay, "retrying after lock contention");
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn succeeds_immediately_when_first_attempt_works() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result: sodav_common::Result<i32> = retry_on_lock(|| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn propagates_non_lock_errors_without_retrying() {
        let calls = Arc::new(AtomicU32::new(0));
        let calls_clone = calls.clone();
        let result: sodav_common::Result<i32> = retry_on_lock(|| {
            let calls = calls_clone.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(sodav_common::Error::NotFound("x".to_string()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
