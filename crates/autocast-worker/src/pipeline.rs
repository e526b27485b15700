//! Narrated video pipeline orchestrator.
//!
//! One run walks a fixed sequence of stages:
//!
//! `GeneratingScript → SynthesizingAudio → MeasuringDuration → Segmenting → Rendering → Uploading`
//!
//! Each stage calls exactly one collaborator and the run moves forward only
//! on success. The first terminal error ends the run; nothing is rolled back
//! and no stage is retried by the orchestrator itself.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::Instrument;

use autocast_dispatch::{DispatchError, RetryExecutor};
use autocast_media::{validate_cues, DurationSegmenter};
use autocast_models::{PipelineStage, PublishMetadata, RunId, RunStatus};

use crate::config::WorkerConfig;
use crate::error::{ProbeError, PublishError, StageError};
use crate::logging::RunLogger;
use crate::metrics::{record_notify_failure, record_run, record_stage, record_stage_failure};
use crate::report::{FailureCategory, PipelineFailure, RunSummary};
use crate::retry::{cancelled, retry_async_if, RetryConfig, RetryResult};
use crate::stages::{DurationProbe, Notifier, Publisher, TextGenerator, VideoRenderer, VoiceSynthesizer};

/// Operation name used in run logs.
pub const RUN_OPERATION: &str = "narrated_video";

// =============================================================================
// Wiring
// =============================================================================

/// External collaborators of one orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub text: Arc<dyn TextGenerator>,
    pub voice: Arc<dyn VoiceSynthesizer>,
    pub probe: Arc<dyn DurationProbe>,
    pub renderer: Arc<dyn VideoRenderer>,
    pub publisher: Arc<dyn Publisher>,
    pub notifier: Arc<dyn Notifier>,
}

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub segmenter: DurationSegmenter,
    /// Target seconds per subtitle cue
    pub seconds_per_cue: f64,
    pub publish_retry: RetryConfig,
    /// Tags added to every publish
    pub default_tags: Vec<String>,
    /// Deadline for a whole run
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            segmenter: DurationSegmenter::default(),
            seconds_per_cue: 4.0,
            publish_retry: RetryConfig::new("publish"),
            default_tags: Vec::new(),
            run_timeout: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_worker_config(config: &WorkerConfig) -> Self {
        Self {
            segmenter: DurationSegmenter::new()
                .with_min_cue_secs(config.min_cue_secs)
                .with_allocation(config.allocation),
            seconds_per_cue: config.seconds_per_cue,
            publish_retry: RetryConfig::from_env("publish", "PUBLISH"),
            default_tags: config.default_tags.clone(),
            run_timeout: Some(config.run_timeout),
        }
    }
}

/// One unit of work: a topic turned into one published video.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub run_id: RunId,
    pub topic: String,
    pub prompt: String,
    /// Overrides the metadata derived from the topic and script.
    pub metadata: Option<PublishMetadata>,
}

impl RunRequest {
    pub fn new(topic: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            run_id: RunId::new(),
            topic: topic.into(),
            prompt: prompt.into(),
            metadata: None,
        }
    }

    pub fn with_run_id(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn with_metadata(mut self, metadata: PublishMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Where a run is, for failure attribution.
#[derive(Debug, Clone, Copy)]
struct Progress {
    stage: PipelineStage,
    /// Calls made by the current stage when it failed.
    attempts: u32,
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Sequences the stages of a run and reports its terminal outcome.
///
/// The executors carry the shared credential pools; everything else a run
/// touches is local to that run.
pub struct PipelineOrchestrator {
    text_executor: RetryExecutor,
    voice_executor: RetryExecutor,
    collaborators: Collaborators,
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(
        text_executor: RetryExecutor,
        voice_executor: RetryExecutor,
        collaborators: Collaborators,
        config: PipelineConfig,
    ) -> Self {
        Self {
            text_executor,
            voice_executor,
            collaborators,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one run to completion or first failure.
    ///
    /// Failures are reported to the notifier before being returned. Once
    /// `cancel_rx` reads `true` the run stops at the next suspension point.
    pub async fn run(
        &self,
        request: RunRequest,
        cancel_rx: watch::Receiver<bool>,
    ) -> Result<RunSummary, PipelineFailure> {
        let logger = RunLogger::new(&request.run_id, RUN_OPERATION);
        let span = logger.create_span();

        async move {
            let started = Instant::now();
            logger.log_start(&request.topic);

            let mut progress = Progress {
                stage: PipelineStage::GeneratingScript,
                attempts: 0,
            };
            let stages = self.run_stages(&request, &logger, &mut progress, cancel_rx, started);
            let outcome = match self.config.run_timeout {
                Some(limit) => tokio::time::timeout(limit, stages)
                    .await
                    .unwrap_or_else(|_| Err(StageError::DeadlineExceeded(limit.as_secs()))),
                None => stages.await,
            };

            let elapsed = started.elapsed();
            match outcome {
                Ok(summary) => {
                    record_run(RunStatus::Done, elapsed);
                    logger.log_completion(&format!(
                        "published {} ({:.1}s audio, {} cues) in {:.1}s",
                        summary.video_id,
                        summary.audio_duration,
                        summary.cue_count,
                        elapsed.as_secs_f64()
                    ));
                    Ok(summary)
                }
                Err(source) => {
                    record_stage_failure(progress.stage);
                    record_run(RunStatus::Failed, elapsed);
                    let failure = PipelineFailure::new(
                        request.run_id.clone(),
                        request.topic.clone(),
                        progress.stage,
                        progress.attempts,
                        source,
                    );
                    logger.log_error(&failure.to_string());
                    self.notify(&failure, &logger).await;
                    Err(failure)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_stages(
        &self,
        request: &RunRequest,
        logger: &RunLogger,
        progress: &mut Progress,
        mut cancel_rx: watch::Receiver<bool>,
        started: Instant,
    ) -> Result<RunSummary, StageError> {
        let text_executor = self.text_executor.clone().with_cancel(cancel_rx.clone());
        let voice_executor = self.voice_executor.clone().with_cancel(cancel_rx.clone());

        // Script
        let stage_started = enter(PipelineStage::GeneratingScript, progress, logger, &cancel_rx)?;
        let prompt = request.prompt.as_str();
        let text = &self.collaborators.text;
        let script = text_executor
            .execute(|credential| async move { text.generate(prompt, &credential).await })
            .await
            .map_err(|e| dispatch_failed(progress, e))?;
        finish(PipelineStage::GeneratingScript, stage_started);
        logger.log_progress(&format!("script ready ({} chars)", script.chars().count()));

        // Narration
        let stage_started = enter(PipelineStage::SynthesizingAudio, progress, logger, &cancel_rx)?;
        let script_text = script.as_str();
        let voice = &self.collaborators.voice;
        let audio = voice_executor
            .execute(|credential| async move { voice.synthesize(script_text, &credential).await })
            .await
            .map_err(|e| dispatch_failed(progress, e))?;
        finish(PipelineStage::SynthesizingAudio, stage_started);
        logger.log_progress(&format!("narration ready ({} bytes)", audio.len()));

        // Duration
        let stage_started = enter(PipelineStage::MeasuringDuration, progress, logger, &cancel_rx)?;
        progress.attempts = 1;
        let duration = until_cancelled(&mut cancel_rx, async {
            self.collaborators
                .probe
                .measure(&audio)
                .await
                .map_err(StageError::from)
        })
        .await?;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(ProbeError::InvalidDuration(duration).into());
        }
        finish(PipelineStage::MeasuringDuration, stage_started);

        // Cues
        let stage_started = enter(PipelineStage::Segmenting, progress, logger, &cancel_rx)?;
        progress.attempts = 1;
        let segmenter = &self.config.segmenter;
        let target = DurationSegmenter::target_for(duration, self.config.seconds_per_cue);
        let cues = segmenter.segment(&script, duration, target)?;
        validate_cues(&cues, duration, segmenter.min_cue_secs)?;
        finish(PipelineStage::Segmenting, stage_started);
        logger.log_progress(&format!("{} cues over {:.2}s", cues.len(), duration));

        // Video
        let stage_started = enter(PipelineStage::Rendering, progress, logger, &cancel_rx)?;
        progress.attempts = 1;
        let video = until_cancelled(&mut cancel_rx, async {
            self.collaborators
                .renderer
                .render(&audio, &cues)
                .await
                .map_err(StageError::from)
        })
        .await?;
        finish(PipelineStage::Rendering, stage_started);

        // Publish
        let stage_started = enter(PipelineStage::Uploading, progress, logger, &cancel_rx)?;
        progress.attempts = 1;
        let metadata = self.metadata_for(request, &script);
        let publisher = &self.collaborators.publisher;
        let backoff_cancel = cancel_rx.clone();
        let published = until_cancelled(&mut cancel_rx, async {
            Ok::<_, StageError>(
                retry_async_if(
                    &self.config.publish_retry,
                    Some(backoff_cancel),
                    |e: &PublishError| e.is_retryable(),
                    || publisher.publish(&video, &metadata),
                )
                .await,
            )
        })
        .await?;
        progress.attempts = published.attempts();
        let video_id = match published {
            RetryResult::Success(id) => id,
            RetryResult::Failed { error, .. } => return Err(error.into()),
            RetryResult::Cancelled { .. } => return Err(StageError::Cancelled),
        };
        finish(PipelineStage::Uploading, stage_started);

        Ok(RunSummary {
            run_id: request.run_id.clone(),
            topic: request.topic.clone(),
            video_id,
            audio_duration: duration,
            cue_count: cues.len(),
            elapsed: started.elapsed(),
        })
    }

    /// Publish metadata: the request override, or topic plus script.
    fn metadata_for(&self, request: &RunRequest, script: &str) -> PublishMetadata {
        let base = request
            .metadata
            .clone()
            .unwrap_or_else(|| PublishMetadata::new(request.topic.clone(), script));
        let tags: Vec<String> = base
            .tags
            .iter()
            .chain(self.config.default_tags.iter())
            .cloned()
            .collect();
        base.with_tags(tags).normalized()
    }

    async fn notify(&self, failure: &PipelineFailure, logger: &RunLogger) {
        if failure.category == FailureCategory::Cancelled {
            logger.log_warning("run cancelled; failure notification skipped");
            return;
        }
        if let Err(e) = self.collaborators.notifier.notify(failure).await {
            record_notify_failure();
            logger.log_warning(&format!("failure notification not delivered: {}", e));
        }
    }
}

// =============================================================================
// Stage helpers
// =============================================================================

fn enter(
    stage: PipelineStage,
    progress: &mut Progress,
    logger: &RunLogger,
    cancel_rx: &watch::Receiver<bool>,
) -> Result<Instant, StageError> {
    progress.stage = stage;
    progress.attempts = 0;
    if *cancel_rx.borrow() {
        return Err(StageError::Cancelled);
    }
    logger.log_stage(stage);
    Ok(Instant::now())
}

fn finish(stage: PipelineStage, stage_started: Instant) {
    record_stage(stage, stage_started.elapsed());
}

fn dispatch_failed(progress: &mut Progress, error: DispatchError) -> StageError {
    progress.attempts = error.attempts();
    StageError::Dispatch(error)
}

/// Race a stage against cancellation; the stage future is dropped on cancel.
async fn until_cancelled<T, F>(cancel_rx: &mut watch::Receiver<bool>, stage: F) -> Result<T, StageError>
where
    F: Future<Output = Result<T, StageError>>,
{
    tokio::select! {
        biased;
        _ = cancelled(cancel_rx) => Err(StageError::Cancelled),
        result = stage => result,
    }
}
