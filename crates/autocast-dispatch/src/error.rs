//! Dispatch error types.

use thiserror::Error;

use autocast_models::CredentialId;

use crate::classify::CallError;

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Terminal outcomes of credential selection and retried execution.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Missing, empty or malformed credential configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No credential is selectable right now.
    #[error("Credential pool '{pool}' exhausted: none of {size} credentials usable (after {attempts} attempts)")]
    PoolExhausted {
        pool: String,
        size: usize,
        attempts: u32,
    },

    /// The call failed in a way retrying cannot fix.
    #[error("Fatal error on attempt {attempts} with credential {credential}: {source}")]
    Fatal {
        attempts: u32,
        credential: CredentialId,
        source: CallError,
    },

    /// Every allowed attempt failed.
    #[error("Retries exhausted after {attempts} attempts across {distinct_credentials} credentials: {last}")]
    RetriesExhausted {
        attempts: u32,
        distinct_credentials: usize,
        #[source]
        last: CallError,
    },

    /// The caller cancelled the run.
    #[error("Cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl DispatchError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Number of calls made before this error was produced.
    pub fn attempts(&self) -> u32 {
        match self {
            DispatchError::Configuration(_) => 0,
            DispatchError::PoolExhausted { attempts, .. }
            | DispatchError::Fatal { attempts, .. }
            | DispatchError::RetriesExhausted { attempts, .. }
            | DispatchError::Cancelled { attempts } => *attempts,
        }
    }

    /// The last underlying call error, if any call was made.
    pub fn call_error(&self) -> Option<&CallError> {
        match self {
            DispatchError::Fatal { source, .. } => Some(source),
            DispatchError::RetriesExhausted { last, .. } => Some(last),
            _ => None,
        }
    }

    pub fn is_pool_exhausted(&self) -> bool {
        matches!(self, DispatchError::PoolExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled { .. })
    }
}
