//! Exponential backoff with jitter, shared by every transport (§7:
//! "Exponential backoff with jitter, unlimited retries up to a max-elapsed").

use {
    crate::error::RpcError,
    std::time::Duration,
    tokio::time::sleep,
};

#[derive(Debug, Clone, Copy)]
pub struct BackoffConfig {
    pub initial: Duration,
    pub max: Duration,
    pub max_elapsed: Duration,
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(200),
            max: Duration::from_secs(10),
            max_elapsed: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Runs `attempt` until it succeeds, returns a non-retryable error, or the
/// configured max-elapsed budget is exhausted (whichever comes first).
pub async fn with_backoff<F, Fut, T>(config: BackoffConfig, mut attempt: F) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, RpcError>>,
{
    let start = std::time::Instant::now();
    let mut delay = config.initial;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && start.elapsed() < config.max_elapsed => {
                tracing::warn!(error = %err, delay_ms = delay.as_millis(), "retrying rpc request");
                let jitter = Duration::from_millis(rand::random::<u64>() % 100);
                sleep(delay + jitter).await;
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.multiplier).min(config.max.as_secs_f64()),
                );
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let config = BackoffConfig {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(2),
            max_elapsed: Duration::from_secs(5),
            multiplier: 2.0,
        };
        let result = with_backoff(config, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(RpcError::Timeout)
            } else {
                Ok(42)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_non_retryable_errors() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(BackoffConfig::default(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(RpcError::RangeTooLarge)
        })
        .await;
        assert!(matches!(result, Err(RpcError::RangeTooLarge)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
