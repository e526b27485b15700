//! Dispatch metrics collection.
//!
//! Provides standardized metrics for monitoring external calls:
//! - Attempt counters by operation and outcome
//! - Latency histograms
//! - Credential cooldown and retirement counters

use std::time::Duration;

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total call attempts by operation and outcome.
    pub const ATTEMPTS_TOTAL: &str = "autocast_dispatch_attempts_total";

    /// Total retries (attempts after the first) by operation.
    pub const RETRIES_TOTAL: &str = "autocast_dispatch_retries_total";

    /// Call latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "autocast_dispatch_latency_seconds";

    /// Credentials put into cooldown, by pool.
    pub const COOLDOWNS_TOTAL: &str = "autocast_credential_cooldowns_total";

    /// Credentials retired for the process lifetime, by pool.
    pub const RETIRED_TOTAL: &str = "autocast_credentials_retired_total";

    /// Selections that found no usable credential, by pool.
    pub const POOL_EXHAUSTED_TOTAL: &str = "autocast_pool_exhausted_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record one finished call attempt.
pub fn record_attempt(operation: &str, outcome: &'static str, latency: Duration) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "operation" => operation.to_string(),
        "outcome" => outcome
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency.as_secs_f64());
}

/// Record a retry attempt.
pub fn record_retry(operation: &str) {
    counter!(
        names::RETRIES_TOTAL,
        "operation" => operation.to_string()
    )
    .increment(1);
}

pub fn record_cooldown(pool: &str) {
    counter!(names::COOLDOWNS_TOTAL, "pool" => pool.to_string()).increment(1);
}

pub fn record_retired(pool: &str) {
    counter!(names::RETIRED_TOTAL, "pool" => pool.to_string()).increment(1);
}

pub fn record_pool_exhausted(pool: &str) {
    counter!(names::POOL_EXHAUSTED_TOTAL, "pool" => pool.to_string()).increment(1);
}

// =============================================================================
// Tests
// =============================================================================
