//! Async retry with exponential backoff

use std::time::Duration;

/// Retry an async operation with exponential backoff.
///
/// Returns `Ok((value, attempts))` on success, or `Err((error, attempts))`
/// once `max_attempts` is exhausted.
pub async fn retry_with_backoff_async<F, Fut, T, E>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if attempts >= max_attempts {
                    return Err((e, attempts));
                }
                let delay = Duration::from_millis(base_delay_ms * 2_u64.pow(attempts - 1));
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_success_on_first_try() {
        let result = retry_with_backoff_async(3, 1, || async { Ok::<_, &str>("id-1") }).await;
        assert_eq!(result, Ok(("id-1", 1)));
    }

    #[tokio::test]
    async fn test_success_after_retry() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff_async(3, 1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err("transient") } else { Ok(n) } }
        })
        .await;
        assert_eq!(result, Ok((1, 2)));
    }

    #[tokio::test]
    async fn test_failure_after_max_attempts() {
        let result = retry_with_backoff_async(3, 1, || async { Err::<(), _>("down") }).await;
        assert_eq!(result, Err(("down", 3)));
    }
}
