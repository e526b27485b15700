//! Run outcomes: the success summary and the structured failure report.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use autocast_dispatch::{CallErrorKind, DispatchError};
use autocast_models::{PipelineStage, PublishedVideoId, RunId};

use crate::error::{ProbeError, PublishError, RenderError, StageError};

/// Coarse cause of a failed run, for operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Credentials retired, rejected or all cooling down.
    Credentials,
    /// Upstream outage or timeouts that outlasted the retry budget.
    Transient,
    /// The request, script or media was malformed.
    InvalidInput,
    Cancelled,
    /// Local tooling or environment problem.
    Internal,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::Credentials => "credentials",
            FailureCategory::Transient => "transient",
            FailureCategory::InvalidInput => "invalid_input",
            FailureCategory::Cancelled => "cancelled",
            FailureCategory::Internal => "internal",
        }
    }

    /// Categorize a stage error.
    pub fn of(error: &StageError) -> Self {
        match error {
            StageError::Dispatch(e) => Self::of_dispatch(e),
            StageError::Probe(ProbeError::Unavailable(_)) => FailureCategory::Internal,
            StageError::Probe(ProbeError::Failed(_)) => FailureCategory::Transient,
            StageError::Probe(ProbeError::InvalidDuration(_)) => FailureCategory::InvalidInput,
            StageError::Segment(_) => FailureCategory::InvalidInput,
            StageError::Render(RenderError::Unavailable(_)) => FailureCategory::Internal,
            StageError::Render(RenderError::Failed(_)) => FailureCategory::Internal,
            StageError::Render(RenderError::Timeout(_)) => FailureCategory::Transient,
            StageError::Render(RenderError::Cancelled) => FailureCategory::Cancelled,
            StageError::Render(RenderError::InvalidInput(_)) => FailureCategory::InvalidInput,
            StageError::Publish(PublishError::Transient(_)) => FailureCategory::Transient,
            StageError::Publish(PublishError::Rejected(_)) => FailureCategory::InvalidInput,
            StageError::Cancelled => FailureCategory::Cancelled,
            StageError::DeadlineExceeded(_) => FailureCategory::Transient,
        }
    }

    fn of_dispatch(error: &DispatchError) -> Self {
        match error {
            DispatchError::Configuration(_) | DispatchError::PoolExhausted { .. } => {
                FailureCategory::Credentials
            }
            DispatchError::Cancelled { .. } => FailureCategory::Cancelled,
            DispatchError::Fatal { source, .. } => match source.kind {
                CallErrorKind::Unauthorized | CallErrorKind::QuotaExceeded => {
                    FailureCategory::Credentials
                }
                _ => FailureCategory::InvalidInput,
            },
            // The last call decides: keys rejected until the budget ran out are not an outage.
            DispatchError::RetriesExhausted { last, .. } => match last.kind {
                CallErrorKind::Unauthorized | CallErrorKind::QuotaExceeded => {
                    FailureCategory::Credentials
                }
                CallErrorKind::BadRequest => FailureCategory::InvalidInput,
                _ => FailureCategory::Transient,
            },
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Error)]
#[error("run {run_id} failed at {stage} ({category}, {attempts} attempts): {source}")]
pub struct PipelineFailure {
    pub run_id: RunId,
    pub topic: String,
    pub stage: PipelineStage,
    /// External calls made by the failing stage.
    pub attempts: u32,
    pub category: FailureCategory,
    #[source]
    pub source: StageError,
}

impl PipelineFailure {
    pub fn new(
        run_id: RunId,
        topic: impl Into<String>,
        stage: PipelineStage,
        attempts: u32,
        source: StageError,
    ) -> Self {
        Self {
            run_id,
            topic: topic.into(),
            stage,
            attempts,
            category: FailureCategory::of(&source),
            source,
        }
    }

    /// Multi-line report for operators.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Run {} failed\nTopic: {}\nStage: {}\nCategory: {}\nAttempts: {}\nError: {}",
            self.run_id, self.topic, self.stage, self.category, self.attempts, self.source
        );
        if let StageError::Dispatch(e) = &self.source {
            if let Some(call) = e.call_error() {
                out.push_str(&format!("\nLast call error: {}", call));
            }
        }
        out
    }
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub topic: String,
    pub video_id: PublishedVideoId,
    /// Narration length in seconds.
    pub audio_duration: f64,
    pub cue_count: usize,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

mod duration_secs {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocast_dispatch::CallError;
    use autocast_models::CredentialId;

    #[test]
    fn test_categories() {
        let exhausted = StageError::Dispatch(DispatchError::PoolExhausted {
            pool: "openai".into(),
            size: 1,
            attempts: 1,
        });
        assert_eq!(FailureCategory::of(&exhausted), FailureCategory::Credentials);

        let outage = StageError::Dispatch(DispatchError::RetriesExhausted {
            attempts: 3,
            distinct_credentials: 2,
            last: CallError::server_error("503"),
        });
        assert_eq!(FailureCategory::of(&outage), FailureCategory::Transient);

        let malformed = StageError::Dispatch(DispatchError::Fatal {
            attempts: 1,
            credential: CredentialId::from_string("key_a"),
            source: CallError::bad_request("bad"),
        });
        assert_eq!(FailureCategory::of(&malformed), FailureCategory::InvalidInput);

        assert_eq!(
            FailureCategory::of(&StageError::Cancelled),
            FailureCategory::Cancelled
        );
    }

    #[test]
    fn test_exhausted_retries_follow_last_error() {
        let exhausted_with = |last: CallError| {
            StageError::Dispatch(DispatchError::RetriesExhausted {
                attempts: 3,
                distinct_credentials: 3,
                last,
            })
        };

        assert_eq!(
            FailureCategory::of(&exhausted_with(CallError::from_http_status(401, "invalid api key"))),
            FailureCategory::Credentials
        );
        assert_eq!(
            FailureCategory::of(&exhausted_with(CallError::quota_exceeded("insufficient_quota"))),
            FailureCategory::Credentials
        );
        assert_eq!(
            FailureCategory::of(&exhausted_with(CallError::bad_request("bad prompt"))),
            FailureCategory::InvalidInput
        );
        assert_eq!(
            FailureCategory::of(&exhausted_with(CallError::timeout("slow"))),
            FailureCategory::Transient
        );
    }

    #[test]
    fn test_report_names_stage_and_attempts() {
        let failure = PipelineFailure::new(
            RunId::from_string("run-1"),
            "space facts",
            PipelineStage::SynthesizingAudio,
            3,
            StageError::Dispatch(DispatchError::RetriesExhausted {
                attempts: 3,
                distinct_credentials: 2,
                last: CallError::server_error("upstream down").with_status(502),
            }),
        );

        let report = failure.report();
        assert!(report.contains("Stage: synthesizing_audio"));
        assert!(report.contains("Attempts: 3"));
        assert!(report.contains("Category: transient"));
        assert!(report.contains("HTTP 502"));
        assert!(failure.to_string().contains("run-1"));
    }
}
