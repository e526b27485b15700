//! External collaborators of the pipeline.
//!
//! The orchestrator only sees these traits; HTTP providers, FFmpeg and the
//! publish destination live behind them.

use async_trait::async_trait;

use autocast_dispatch::CallError;
use autocast_models::{AudioBytes, Credential, Cue, PublishMetadata, PublishedVideoId, VideoBytes};

use crate::error::{NotifyError, ProbeError, PublishError, RenderError};
use crate::report::PipelineFailure;

/// Generates the narration script for a prompt.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<String, CallError>;
}

/// Turns a script into narration audio.
#[async_trait]
pub trait VoiceSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str, credential: &Credential) -> Result<AudioBytes, CallError>;
}

/// Measures audio length in seconds.
#[async_trait]
pub trait DurationProbe: Send + Sync {
    async fn measure(&self, audio: &AudioBytes) -> Result<f64, ProbeError>;
}

/// Renders narration audio plus timed cues into a video.
#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn render(&self, audio: &AudioBytes, cues: &[Cue]) -> Result<VideoBytes, RenderError>;
}

/// Publishes a finished video.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        video: &VideoBytes,
        metadata: &PublishMetadata,
    ) -> Result<PublishedVideoId, PublishError>;
}

/// Receives terminal run failures.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, failure: &PipelineFailure) -> Result<(), NotifyError>;
}
