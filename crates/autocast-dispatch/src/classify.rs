//! Per-call errors and their retry classification.

use std::fmt;

/// What went wrong with a single external call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallErrorKind {
    /// The call did not answer within its deadline
    Timeout,
    /// Provider-side failure (HTTP 5xx)
    ServerError,
    /// Short-term throttling (HTTP 429 without a quota marker)
    RateLimited,
    /// The credential's usage allowance is spent
    QuotaExceeded,
    /// The provider rejected the credential itself (HTTP 401/403)
    Unauthorized,
    /// Malformed request; resending it cannot help
    BadRequest,
    /// Connection-level failure before a response arrived
    Network,
    Unknown,
}

impl CallErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallErrorKind::Timeout => "timeout",
            CallErrorKind::ServerError => "server_error",
            CallErrorKind::RateLimited => "rate_limited",
            CallErrorKind::QuotaExceeded => "quota_exceeded",
            CallErrorKind::Unauthorized => "unauthorized",
            CallErrorKind::BadRequest => "bad_request",
            CallErrorKind::Network => "network",
            CallErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CallErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error reported by an external collaborator for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallError {
    pub kind: CallErrorKind,
    /// HTTP-like status code, when the provider returned one
    pub status: Option<u16>,
    pub message: String,
}

/// Body fragments that mark a 429 as spent quota rather than throttling.
const QUOTA_MARKERS: [&str; 3] = ["insufficient_quota", "quota_exceeded", "quota"];

impl CallError {
    pub fn new(kind: CallErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::Timeout, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::ServerError, message)
    }

    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::QuotaExceeded, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::BadRequest, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(CallErrorKind::Unknown, message)
    }

    /// Map an HTTP error status (and response body) to a call error.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let kind = match status {
            408 | 504 => CallErrorKind::Timeout,
            429 => {
                let lower = body.to_lowercase();
                if QUOTA_MARKERS.iter().any(|m| lower.contains(m)) {
                    CallErrorKind::QuotaExceeded
                } else {
                    CallErrorKind::RateLimited
                }
            }
            401 | 403 => CallErrorKind::Unauthorized,
            400..=499 => CallErrorKind::BadRequest,
            500..=599 => CallErrorKind::ServerError,
            _ => CallErrorKind::Unknown,
        };
        Self::new(kind, body.trim()).with_status(status)
    }
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (HTTP {}): {}", self.kind, status, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CallError {}

/// How the retry executor reacts to a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Transient; back off and try again
    Retryable,
    /// Credential is spent; retire it and move to the next one immediately
    Quota,
    /// Stop and surface the error
    Fatal,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Retryable => "retryable",
            Classification::Quota => "quota",
            Classification::Fatal => "fatal",
        }
    }
}

/// Default classifier for [`CallError`].
///
/// Credential-level rejections are treated like spent quota: the
/// credential is retired and another one is tried.
pub fn classify_call_error(err: &CallError) -> Classification {
    match err.kind {
        CallErrorKind::QuotaExceeded | CallErrorKind::Unauthorized => Classification::Quota,
        CallErrorKind::BadRequest => Classification::Fatal,
        CallErrorKind::Timeout
        | CallErrorKind::ServerError
        | CallErrorKind::RateLimited
        | CallErrorKind::Network
        | CallErrorKind::Unknown => Classification::Retryable,
    }
}
