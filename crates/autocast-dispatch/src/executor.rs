//! Retry executor with credential rotation.
//!
//! Wraps a single external call:
//! - selects a credential from the pool for every attempt
//! - bounds each call by a per-call timeout
//! - classifies failures into retryable / quota / fatal
//! - backs off exponentially with jitter between retryable failures
//! - stops early on cancellation, fatal errors or an exhausted pool
//!
//! The executor carries no state between `execute` calls; all health
//! information lives in the [`CredentialPool`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info_span, warn, Instrument};

use autocast_models::{Credential, CredentialId};

use crate::classify::{classify_call_error, CallError, Classification};
use crate::error::{DispatchError, DispatchResult};
use crate::metrics::{record_attempt, record_retry};
use crate::pool::CredentialPool;

// =============================================================================
// Configuration
// =============================================================================

/// Retry policy for one kind of external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of calls, including the first one (at least 1).
    pub max_attempts: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Cap on the exponential part of the delay.
    pub max_delay: Duration,
    /// Deadline for a single call.
    pub call_timeout: Duration,
    /// Add `random(0, base_delay)` to each delay.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            call_timeout: Duration::from_secs(60),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create config from environment variables, e.g. `OPENAI_MAX_ATTEMPTS`.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let env_u64 = |suffix: &str| -> Option<u64> {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .and_then(|s| s.parse().ok())
        };

        Self {
            max_attempts: env_u64("MAX_ATTEMPTS")
                .map(|v| v.clamp(1, u32::MAX as u64) as u32)
                .unwrap_or(defaults.max_attempts),
            base_delay: env_u64("RETRY_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            max_delay: env_u64("RETRY_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            call_timeout: env_u64("CALL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.call_timeout),
            jitter: defaults.jitter,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Delay before the attempt following `attempt` (1-based).
    ///
    /// `min(max_delay, base_delay * 2^attempt) + random(0, base_delay)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let exp = self.base_delay.saturating_mul(factor).min(self.max_delay);

        let base_ms = self.base_delay.as_millis() as u64;
        if !self.jitter || base_ms == 0 {
            return exp;
        }
        let jitter_ms = rand::rng().random_range(0..=base_ms);
        exp.saturating_add(Duration::from_millis(jitter_ms))
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

// =============================================================================
// Attempt Records
// =============================================================================

/// Outcome of a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Retryable,
    Quota,
    Fatal,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Retryable => "retryable_error",
            AttemptOutcome::Quota => "quota_error",
            AttemptOutcome::Fatal => "fatal_error",
        }
    }
}

impl From<Classification> for AttemptOutcome {
    fn from(c: Classification) -> Self {
        match c {
            Classification::Retryable => AttemptOutcome::Retryable,
            Classification::Quota => AttemptOutcome::Quota,
            Classification::Fatal => AttemptOutcome::Fatal,
        }
    }
}

/// Record of one call made inside a single `execute`.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub attempt_number: u32,
    pub credential_id: CredentialId,
    pub outcome: AttemptOutcome,
    pub latency: Duration,
}

// =============================================================================
// Executor
// =============================================================================

type Classifier = Arc<dyn Fn(&CallError) -> Classification + Send + Sync>;

/// Executes calls against a credential pool with classified retries.
#[derive(Clone)]
pub struct RetryExecutor {
    operation: String,
    pool: Arc<CredentialPool>,
    policy: RetryPolicy,
    classifier: Classifier,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("operation", &self.operation)
            .field("pool", &self.pool.name())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    /// Create an executor using the default [`classify_call_error`] classifier.
    pub fn new(operation: impl Into<String>, pool: Arc<CredentialPool>, policy: RetryPolicy) -> Self {
        Self {
            operation: operation.into(),
            pool,
            policy,
            classifier: Arc::new(classify_call_error),
            cancel_rx: None,
        }
    }

    /// Replace the error classifier.
    pub fn with_classifier<F>(mut self, classifier: F) -> Self
    where
        F: Fn(&CallError) -> Classification + Send + Sync + 'static,
    {
        self.classifier = Arc::new(classifier);
        self
    }

    /// Set cancellation signal; `true` aborts in-flight calls and backoff sleeps.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `call` until it succeeds or the policy gives up.
    ///
    /// `call` is invoked at most `max_attempts` times, each time with the
    /// credential the pool selected for that attempt.
    pub async fn execute<T, F, Fut>(&self, mut call: F) -> DispatchResult<T>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let max_attempts = self.policy.attempts();
        let mut cancel_rx = self.cancel_rx.clone();
        let mut history: Vec<RetryAttempt> = Vec::with_capacity(max_attempts as usize);
        let mut last_error: Option<CallError> = None;

        for attempt in 1..=max_attempts {
            if is_cancelled(cancel_rx.as_ref()) {
                return Err(DispatchError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let credential = match self.pool.select() {
                Ok(credential) => credential,
                Err(DispatchError::PoolExhausted { pool, size, .. }) => {
                    warn!(
                        operation = %self.operation,
                        attempt,
                        pool = %pool,
                        "No usable credential, giving up"
                    );
                    return Err(DispatchError::PoolExhausted {
                        pool,
                        size,
                        attempts: attempt - 1,
                    });
                }
                Err(e) => return Err(e),
            };
            let credential_id = credential.id().clone();

            let span = info_span!(
                "dispatch_attempt",
                operation = %self.operation,
                attempt,
                credential = %credential_id
            );
            let started = Instant::now();
            let timed = tokio::time::timeout(self.policy.call_timeout, call(credential));

            let result = tokio::select! {
                biased;
                _ = wait_for_cancel(cancel_rx.as_mut()) => {
                    warn!(operation = %self.operation, attempt, "Call cancelled in flight");
                    return Err(DispatchError::Cancelled { attempts: attempt });
                }
                result = timed.instrument(span) => result,
            };
            let latency = started.elapsed();

            let error = match result {
                Ok(Ok(value)) => {
                    self.pool.record_success(&credential_id);
                    record_attempt(&self.operation, AttemptOutcome::Success.as_str(), latency);
                    history.push(RetryAttempt {
                        attempt_number: attempt,
                        credential_id,
                        outcome: AttemptOutcome::Success,
                        latency,
                    });
                    debug!(
                        operation = %self.operation,
                        attempt,
                        latency_ms = latency.as_millis() as u64,
                        "Call succeeded"
                    );
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => CallError::timeout(format!(
                    "call exceeded {}ms deadline",
                    self.policy.call_timeout.as_millis()
                )),
            };

            let classification = (self.classifier)(&error);
            let outcome = AttemptOutcome::from(classification);
            self.pool
                .record_failure(&credential_id, classification == Classification::Quota);
            record_attempt(&self.operation, outcome.as_str(), latency);
            history.push(RetryAttempt {
                attempt_number: attempt,
                credential_id: credential_id.clone(),
                outcome,
                latency,
            });

            match classification {
                Classification::Fatal => {
                    warn!(
                        operation = %self.operation,
                        attempt,
                        credential = %credential_id,
                        "Fatal call error, not retrying: {}",
                        error
                    );
                    return Err(DispatchError::Fatal {
                        attempts: attempt,
                        credential: credential_id,
                        source: error,
                    });
                }
                Classification::Quota => {
                    warn!(
                        operation = %self.operation,
                        attempt,
                        credential = %credential_id,
                        "Credential quota error, rotating: {}",
                        error
                    );
                    if attempt < max_attempts {
                        record_retry(&self.operation);
                    }
                }
                Classification::Retryable => {
                    if attempt < max_attempts {
                        let delay = self.policy.backoff_delay(attempt);
                        warn!(
                            operation = %self.operation,
                            attempt,
                            credential = %credential_id,
                            delay_ms = delay.as_millis() as u64,
                            "Call failed, retrying: {}",
                            error
                        );
                        record_retry(&self.operation);
                        if !sleep_unless_cancelled(delay, cancel_rx.as_mut()).await {
                            return Err(DispatchError::Cancelled { attempts: attempt });
                        }
                    } else {
                        warn!(
                            operation = %self.operation,
                            attempt,
                            credential = %credential_id,
                            "Call failed on final attempt: {}",
                            error
                        );
                    }
                }
            }

            last_error = Some(error);
        }

        let distinct_credentials = history
            .iter()
            .map(|a| &a.credential_id)
            .collect::<HashSet<_>>()
            .len();

        Err(DispatchError::RetriesExhausted {
            attempts: max_attempts,
            distinct_credentials,
            last: last_error.unwrap_or_else(|| CallError::unknown("no attempt completed")),
        })
    }
}

fn is_cancelled(cancel_rx: Option<&watch::Receiver<bool>>) -> bool {
    cancel_rx.map(|rx| *rx.borrow()).unwrap_or(false)
}

/// Resolve once the cancel flag is set; never resolves without a receiver
/// or after the sender is dropped.
async fn wait_for_cancel(cancel_rx: Option<&mut watch::Receiver<bool>>) {
    let Some(rx) = cancel_rx else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}

/// Sleep for `delay`; returns `false` if cancelled first.
async fn sleep_unless_cancelled(delay: Duration, cancel_rx: Option<&mut watch::Receiver<bool>>) -> bool {
    tokio::select! {
        biased;
        _ = wait_for_cancel(cancel_rx) => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

// =============================================================================
// Tests
// =============================================================================
