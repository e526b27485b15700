//! Credential pool with health tracking and cooldowns.
//!
//! The pool owns a fixed set of interchangeable credentials and their
//! usage statistics. All reads and writes go through one mutex so a
//! concurrent caller never observes a half-applied update.
//!
//! ```text
//! select() ──▶ not retired, quota left, cooldown elapsed
//!                 │
//!                 ▼
//!          fewest failures in window ─▶ least recently selected ─▶ pool order
//! ```

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use autocast_models::{Credential, CredentialId};

use crate::error::{DispatchError, DispatchResult};
use crate::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Cooldown policy for failing credentials.
#[derive(Debug, Clone)]
pub struct CooldownConfig {
    /// Consecutive failures before a credential enters cooldown.
    pub failure_threshold: u32,
    /// Cooldown applied at the threshold; doubles per further failure.
    pub base_cooldown: Duration,
    /// Upper bound for any single cooldown.
    pub max_cooldown: Duration,
    /// Trailing window used to rank credentials by recent failures.
    pub failure_window: Duration,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            base_cooldown: Duration::from_secs(5),
            max_cooldown: Duration::from_secs(600),
            failure_window: Duration::from_secs(600),
        }
    }
}

impl CooldownConfig {
    /// Create config from environment variables, e.g. `OPENAI_COOLDOWN_BASE_SECS`.
    pub fn from_env(prefix: &str) -> Self {
        let defaults = Self::default();
        let env_u64 = |suffix: &str| -> Option<u64> {
            std::env::var(format!("{}_{}", prefix, suffix))
                .ok()
                .and_then(|s| s.parse().ok())
        };

        Self {
            failure_threshold: env_u64("COOLDOWN_THRESHOLD")
                .map(|v| v.max(1) as u32)
                .unwrap_or(defaults.failure_threshold),
            base_cooldown: env_u64("COOLDOWN_BASE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.base_cooldown),
            max_cooldown: env_u64("COOLDOWN_MAX_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_cooldown),
            failure_window: env_u64("FAILURE_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.failure_window),
        }
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn with_base_cooldown(mut self, base: Duration) -> Self {
        self.base_cooldown = base;
        self
    }

    pub fn with_max_cooldown(mut self, max: Duration) -> Self {
        self.max_cooldown = max;
        self
    }

    /// Cooldown owed after `consecutive_failures`, if any.
    ///
    /// `min(max_cooldown, base_cooldown * 2^(consecutive_failures - failure_threshold))`
    pub fn cooldown_for(&self, consecutive_failures: u32) -> Option<Duration> {
        if consecutive_failures < self.failure_threshold {
            return None;
        }
        let exponent = consecutive_failures - self.failure_threshold;
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        Some(self.base_cooldown.saturating_mul(factor).min(self.max_cooldown))
    }
}

// =============================================================================
// Credential State
// =============================================================================

#[derive(Debug)]
struct CredentialState {
    credential: Credential,
    consecutive_failures: u32,
    total_success: u64,
    total_failure: u64,
    recent_failures: VecDeque<Instant>,
    quota_remaining: Option<u64>,
    cooldown_until: Option<Instant>,
    retired: bool,
    /// Selection sequence number of the last pick; 0 means never picked.
    last_used_seq: u64,
}

impl CredentialState {
    fn new(credential: Credential) -> Self {
        Self {
            credential,
            consecutive_failures: 0,
            total_success: 0,
            total_failure: 0,
            recent_failures: VecDeque::new(),
            quota_remaining: None,
            cooldown_until: None,
            retired: false,
            last_used_seq: 0,
        }
    }

    fn is_selectable(&self, now: Instant) -> bool {
        !self.retired
            && self.quota_remaining != Some(0)
            && self.cooldown_until.map_or(true, |until| until <= now)
    }

    fn failures_within(&self, now: Instant, window: Duration) -> usize {
        self.recent_failures
            .iter()
            .filter(|at| now.saturating_duration_since(**at) <= window)
            .count()
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(front) = self.recent_failures.front() {
            if now.saturating_duration_since(*front) > window {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
    }

    fn snapshot(&self, now: Instant, window: Duration) -> CredentialSnapshot {
        CredentialSnapshot {
            id: self.credential.id().clone(),
            fingerprint: self.credential.fingerprint().to_string(),
            consecutive_failures: self.consecutive_failures,
            total_success: self.total_success,
            total_failure: self.total_failure,
            recent_failures: self.failures_within(now, window),
            quota_remaining: self.quota_remaining,
            cooldown_remaining_ms: self
                .cooldown_until
                .filter(|until| *until > now)
                .map(|until| until.saturating_duration_since(now).as_millis() as u64),
            retired: self.retired,
        }
    }
}

/// Point-in-time view of one credential, safe to log or serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialSnapshot {
    pub id: CredentialId,
    pub fingerprint: String,
    pub consecutive_failures: u32,
    pub total_success: u64,
    pub total_failure: u64,
    pub recent_failures: usize,
    pub quota_remaining: Option<u64>,
    pub cooldown_remaining_ms: Option<u64>,
    pub retired: bool,
}

impl CredentialSnapshot {
    pub fn is_cooling_down(&self) -> bool {
        self.cooldown_remaining_ms.is_some()
    }
}

#[derive(Debug)]
struct PoolInner {
    states: Vec<CredentialState>,
    next_seq: u64,
}

// =============================================================================
// Pool
// =============================================================================

/// Thread-safe pool of interchangeable credentials.
///
/// Constructed explicitly and shared by handle (`Arc<CredentialPool>`);
/// independent pools never share state.
#[derive(Debug)]
pub struct CredentialPool {
    name: String,
    cooldown: CooldownConfig,
    inner: Mutex<PoolInner>,
}

impl CredentialPool {
    /// Create a pool. Fails fast when no credential is supplied.
    ///
    /// Duplicate secrets are dropped (with a warning) so each entry
    /// represents a distinct allowance.
    pub fn new(
        name: impl Into<String>,
        credentials: Vec<Credential>,
        cooldown: CooldownConfig,
    ) -> DispatchResult<Self> {
        let name = name.into();
        if credentials.is_empty() {
            return Err(DispatchError::configuration(format!(
                "credential pool '{}' has no credentials",
                name
            )));
        }

        let mut seen = HashSet::new();
        let mut states = Vec::with_capacity(credentials.len());
        for credential in credentials {
            if !seen.insert(credential.id().clone()) {
                warn!(
                    pool = %name,
                    credential = %credential.id(),
                    "Duplicate credential ignored"
                );
                continue;
            }
            states.push(CredentialState::new(credential));
        }

        info!(
            pool = %name,
            count = states.len(),
            "Credential pool ready"
        );

        Ok(Self {
            name,
            cooldown,
            inner: Mutex::new(PoolInner { states, next_seq: 0 }),
        })
    }

    /// Track a usage allowance per credential.
    ///
    /// Each success spends one unit; a credential at zero is not selected.
    pub fn with_quota_limit(self, limit: u64) -> Self {
        {
            let mut inner = self.lock();
            for state in inner.states.iter_mut() {
                state.quota_remaining = Some(limit);
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cooldown_config(&self) -> &CooldownConfig {
        &self.cooldown
    }

    /// Number of distinct credentials in the pool.
    pub fn len(&self) -> usize {
        self.lock().states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of credentials selectable right now.
    pub fn available(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .states
            .iter()
            .filter(|s| s.is_selectable(now))
            .count()
    }

    /// Pick the credential for the next call.
    ///
    /// Among selectable credentials, prefers the fewest failures inside the
    /// trailing window, then the least recently selected. Only the chosen
    /// credential's recency is updated; failure counters are never touched.
    pub fn select(&self) -> DispatchResult<Credential> {
        let now = Instant::now();
        let window = self.cooldown.failure_window;
        let mut guard = self.lock();
        let PoolInner { states, next_seq } = &mut *guard;

        let chosen = states
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_selectable(now))
            .min_by_key(|(i, s)| (s.failures_within(now, window), s.last_used_seq, *i))
            .map(|(i, _)| i);

        let Some(index) = chosen else {
            let size = states.len();
            warn!(pool = %self.name, size, "No usable credential in pool");
            metrics::record_pool_exhausted(&self.name);
            return Err(DispatchError::PoolExhausted {
                pool: self.name.clone(),
                size,
                attempts: 0,
            });
        };

        *next_seq += 1;
        let state = &mut states[index];
        state.last_used_seq = *next_seq;

        debug!(
            pool = %self.name,
            credential = %state.credential.id(),
            fingerprint = %state.credential.fingerprint(),
            "Selected credential"
        );
        Ok(state.credential.clone())
    }

    /// Record a successful call made with `id`.
    pub fn record_success(&self, id: &CredentialId) {
        let mut inner = self.lock();
        let Some(state) = inner.states.iter_mut().find(|s| s.credential.id() == id) else {
            warn!(pool = %self.name, credential = %id, "Success recorded for unknown credential");
            return;
        };

        state.consecutive_failures = 0;
        state.total_success += 1;
        if let Some(quota) = state.quota_remaining.as_mut() {
            *quota = quota.saturating_sub(1);
            if *quota == 0 {
                info!(pool = %self.name, credential = %id, "Credential quota spent");
            }
        }
    }

    /// Record a failed call made with `id`.
    ///
    /// Quota failures retire the credential for the process lifetime.
    /// Other failures put it into cooldown once the consecutive-failure
    /// threshold is reached, growing exponentially up to `max_cooldown`.
    pub fn record_failure(&self, id: &CredentialId, is_quota_error: bool) {
        let now = Instant::now();
        let window = self.cooldown.failure_window;
        let mut inner = self.lock();
        let Some(state) = inner.states.iter_mut().find(|s| s.credential.id() == id) else {
            warn!(pool = %self.name, credential = %id, "Failure recorded for unknown credential");
            return;
        };

        state.consecutive_failures += 1;
        state.total_failure += 1;
        state.recent_failures.push_back(now);
        state.prune(now, window);

        if is_quota_error {
            state.quota_remaining = Some(0);
            state.retired = true;
            warn!(
                pool = %self.name,
                credential = %id,
                fingerprint = %state.credential.fingerprint(),
                "Credential retired after quota error"
            );
            metrics::record_retired(&self.name);
            return;
        }

        if let Some(cooldown) = self.cooldown.cooldown_for(state.consecutive_failures) {
            state.cooldown_until = Some(now + cooldown);
            warn!(
                pool = %self.name,
                credential = %id,
                consecutive_failures = state.consecutive_failures,
                cooldown_ms = cooldown.as_millis() as u64,
                "Credential cooling down"
            );
            metrics::record_cooldown(&self.name);
        }
    }

    /// Per-credential statistics, in pool order.
    pub fn snapshot(&self) -> Vec<CredentialSnapshot> {
        let now = Instant::now();
        let window = self.cooldown.failure_window;
        self.lock()
            .states
            .iter()
            .map(|s| s.snapshot(now, window))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Tests
// =============================================================================
