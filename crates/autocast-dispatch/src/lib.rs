//! Resilient request dispatch against a pool of interchangeable credentials.
//!
//! This crate provides:
//! - `CredentialPool`: health-tracked credential selection with cooldowns
//! - `RetryExecutor`: classified retries with backoff, rotation and cancellation
//! - `CallError`: the per-call outcome every external collaborator reports
//! - Credential loading and shape validation from environment variables

pub mod classify;
pub mod error;
pub mod executor;
pub mod loader;
pub mod metrics;
pub mod pool;

pub use classify::{classify_call_error, CallError, CallErrorKind, Classification};
pub use error::{DispatchError, DispatchResult};
pub use executor::{AttemptOutcome, RetryAttempt, RetryExecutor, RetryPolicy};
pub use loader::{decode_secrets, load_credentials, load_credentials_from_env, CredentialFormat};
pub use pool::{CooldownConfig, CredentialPool, CredentialSnapshot};
