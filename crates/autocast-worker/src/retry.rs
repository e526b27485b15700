//! Retry utilities with exponential backoff.
//!
//! Used for calls that have no credential pool behind them (publishing).
//! Credentialed calls go through `autocast_dispatch::RetryExecutor`.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (not including the initial attempt).
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Operation name for logging.
    pub operation_name: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            operation_name: "operation".to_string(),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with the given operation name.
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            ..Default::default()
        }
    }

    /// Read `{prefix}_MAX_RETRIES`, `{prefix}_RETRY_BASE_MS` and `{prefix}_RETRY_MAX_MS`.
    pub fn from_env(operation_name: impl Into<String>, prefix: &str) -> Self {
        let defaults = Self::new(operation_name);
        let env_u64 = |suffix: &str| -> Option<u64> {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .and_then(|s| s.parse().ok())
        };

        Self {
            max_retries: env_u64("MAX_RETRIES")
                .map(|v| v.min(u32::MAX as u64) as u32)
                .unwrap_or(defaults.max_retries),
            base_delay: env_u64("RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: env_u64("RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            operation_name: defaults.operation_name,
        }
    }

    /// Set the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the base delay for exponential backoff.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Calculate delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Result of a retry operation.
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a non-retryable error or after all retries.
    Failed { error: E, attempts: u32 },
    /// Cancellation arrived during a backoff sleep.
    Cancelled { error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Returns true if the operation succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, RetryResult::Success(_))
    }

    /// Number of calls made (1 for an immediate success).
    pub fn attempts(&self) -> u32 {
        match self {
            RetryResult::Success(_) => 1,
            RetryResult::Failed { attempts, .. } | RetryResult::Cancelled { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(v) => Ok(v),
            RetryResult::Failed { error, .. } | RetryResult::Cancelled { error, .. } => Err(error),
        }
    }
}

/// Execute an async operation, retrying every error.
pub async fn retry_async<F, Fut, T, E>(config: &RetryConfig, operation: F) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    retry_async_if(config, None, |_: &E| true, operation).await
}

/// Execute an async operation, retrying errors accepted by `should_retry`.
///
/// Backoff sleeps end early with [`RetryResult::Cancelled`] once `cancel_rx`
/// reads `true`.
pub async fn retry_async_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    mut cancel_rx: Option<watch::Receiver<bool>>,
    should_retry: P,
    operation: F,
) -> RetryResult<T, E>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;

    loop {
        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(e) if attempt < config.max_retries && should_retry(&e) => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                debug!(
                    "{} attempt {} failed, retrying in {:?}: {}",
                    config.operation_name, attempt, delay, e
                );

                let was_cancelled = match cancel_rx.as_mut() {
                    Some(rx) => {
                        tokio::select! {
                            biased;
                            _ = cancelled(rx) => true,
                            _ = tokio::time::sleep(delay) => false,
                        }
                    }
                    None => {
                        tokio::time::sleep(delay).await;
                        false
                    }
                };
                if was_cancelled {
                    warn!("{} cancelled during backoff", config.operation_name);
                    return RetryResult::Cancelled {
                        error: e,
                        attempts: attempt,
                    };
                }
            }
            Err(e) => {
                return RetryResult::Failed {
                    error: e,
                    attempts: attempt + 1,
                }
            }
        }
    }
}

/// Resolves once the flag reads `true`; pends forever if the sender is gone.
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|c| *c).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_retry_config_delay_calculation() {
        let config = RetryConfig::new("test").with_base_delay(Duration::from_millis(100));

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(800));
        assert_eq!(config.delay_for_attempt(64), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_async_immediate_success() {
        let config = RetryConfig::new("test");
        let call_count = AtomicU32::new(0);

        let result = retry_async(&config, || {
            call_count.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, String>(42) }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.into_result().unwrap(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_async_eventual_success() {
        let config = RetryConfig::new("test");
        let call_count = AtomicU32::new(0);

        let result = retry_async(&config, || {
            let count = call_count.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err("transient error")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_stops_immediately() {
        let config = RetryConfig::new("test").with_max_retries(5);
        let call_count = AtomicU32::new(0);

        let result = retry_async_if(
            &config,
            None,
            |e: &&str| *e != "rejected",
            || {
                call_count.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("rejected") }
            },
        )
        .await;

        assert_eq!(result.attempts(), 1);
        assert!(matches!(result, RetryResult::Failed { error: "rejected", attempts: 1 }));
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_retries() {
        let config = RetryConfig::new("test").with_max_retries(2);
        let result = retry_async(&config, || async { Err::<(), _>("down") }).await;
        assert!(matches!(result, RetryResult::Failed { attempts: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let (tx, rx) = watch::channel(false);
        let config = RetryConfig::new("test").with_base_delay(Duration::from_secs(60));

        let handle = tokio::spawn(async move {
            retry_async_if(&config, Some(rx), |_: &&str| true, || async {
                Err::<(), _>("down")
            })
            .await
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(matches!(result, RetryResult::Cancelled { attempts: 1, .. }));
    }
}
