//! Shared HTTP plumbing for provider clients.

use std::time::Duration;

use reqwest::{Client, Response};

use autocast_dispatch::CallError;

use crate::error::{WorkerError, WorkerResult};

/// Longest response body kept in an error message.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Build a client with connect/request timeouts.
///
/// The request timeout is a backstop; the retry executor enforces the
/// per-call deadline.
pub fn build_client(request_timeout: Duration) -> WorkerResult<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(request_timeout)
        .user_agent(concat!("autocast/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(WorkerError::from)
}

/// Map a transport-level failure to a call error.
pub fn call_error_from_reqwest(e: reqwest::Error) -> CallError {
    if e.is_timeout() {
        CallError::timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        CallError::network(e.to_string())
    } else if e.is_decode() || e.is_body() {
        CallError::unknown(format!("invalid response body: {}", e))
    } else {
        CallError::unknown(e.to_string())
    }
}

/// Pass through 2xx responses; turn anything else into a classified error.
pub async fn check_status(response: Response) -> Result<Response, CallError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    Err(CallError::from_http_status(status.as_u16(), &body))
}
