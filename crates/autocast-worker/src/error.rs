//! Worker error types.

use thiserror::Error;

use autocast_dispatch::DispatchError;
use autocast_media::{MediaError, SegmentError};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors outside a single pipeline run (startup, wiring, IO).
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// Failure measuring the narration length.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe tool unavailable: {0}")]
    Unavailable(String),

    #[error("probe failed: {0}")]
    Failed(String),

    #[error("measured duration {0} is not a positive number of seconds")]
    InvalidDuration(f64),
}

impl From<MediaError> for ProbeError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::FfprobeNotFound | MediaError::FfmpegNotFound => {
                ProbeError::Unavailable(e.to_string())
            }
            other => ProbeError::Failed(other.to_string()),
        }
    }
}

/// Failure turning audio and cues into a video.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer unavailable: {0}")]
    Unavailable(String),

    #[error("render failed: {0}")]
    Failed(String),

    #[error("render timed out after {0} seconds")]
    Timeout(u64),

    #[error("render cancelled")]
    Cancelled,

    #[error("invalid render input: {0}")]
    InvalidInput(String),
}

impl From<MediaError> for RenderError {
    fn from(e: MediaError) -> Self {
        match e {
            MediaError::FfmpegNotFound | MediaError::FfprobeNotFound => {
                RenderError::Unavailable(e.to_string())
            }
            MediaError::Timeout(secs) => RenderError::Timeout(secs),
            MediaError::Cancelled => RenderError::Cancelled,
            MediaError::Segment(inner) => RenderError::InvalidInput(inner.to_string()),
            MediaError::InvalidMedia(msg) => RenderError::InvalidInput(msg),
            MediaError::FfmpegFailed {
                message, stderr, ..
            } => match stderr {
                Some(stderr) => RenderError::Failed(format!("{}: {}", message, stderr)),
                None => RenderError::Failed(message),
            },
            other => RenderError::Failed(other.to_string()),
        }
    }
}

/// Failure publishing a rendered video.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Worth retrying (network, temporary storage trouble).
    #[error("transient publish error: {0}")]
    Transient(String),

    /// The destination refused the video or its metadata.
    #[error("publish rejected: {0}")]
    Rejected(String),
}

impl PublishError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

/// Failure delivering a failure notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("notification rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Terminal error of one pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("run cancelled")]
    Cancelled,

    #[error("run exceeded its {0} second deadline")]
    DeadlineExceeded(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_retryable() {
        assert!(PublishError::transient("503").is_retryable());
        assert!(!PublishError::rejected("bad title").is_retryable());
    }

    #[test]
    fn test_render_error_from_media() {
        assert!(matches!(
            RenderError::from(MediaError::Timeout(30)),
            RenderError::Timeout(30)
        ));
        assert!(matches!(
            RenderError::from(MediaError::Cancelled),
            RenderError::Cancelled
        ));
        let failed = RenderError::from(MediaError::ffmpeg_failed(
            "exit 1",
            Some("Invalid data".to_string()),
            Some(1),
        ));
        assert!(failed.to_string().contains("Invalid data"));
    }

    #[test]
    fn test_probe_error_from_media() {
        assert!(matches!(
            ProbeError::from(MediaError::FfprobeNotFound),
            ProbeError::Unavailable(_)
        ));
        assert!(matches!(
            ProbeError::from(MediaError::invalid_media("empty")),
            ProbeError::Failed(_)
        ));
    }
}
