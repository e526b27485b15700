//! FFprobe/FFmpeg adapters for the probe and render stages.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::watch;

use autocast_media::{probe_duration_bytes, FfmpegSubtitleRenderer, RenderConfig};
use autocast_models::{AudioBytes, Cue, VideoBytes};

use crate::error::{ProbeError, RenderError};
use crate::stages::{DurationProbe, VideoRenderer};

/// Container extension of synthesized narration.
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

/// Measures narration length with ffprobe.
#[derive(Debug, Clone)]
pub struct FfprobeDurationProbe {
    audio_extension: String,
    work_dir: PathBuf,
}

impl Default for FfprobeDurationProbe {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_EXTENSION)
    }
}

impl FfprobeDurationProbe {
    pub fn new(audio_extension: impl Into<String>) -> Self {
        Self {
            audio_extension: audio_extension.into(),
            work_dir: std::env::temp_dir(),
        }
    }

    /// Directory that holds the audio while ffprobe reads it.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

#[async_trait]
impl DurationProbe for FfprobeDurationProbe {
    async fn measure(&self, audio: &AudioBytes) -> Result<f64, ProbeError> {
        let duration = probe_duration_bytes(&self.work_dir, audio.as_slice(), &self.audio_extension).await?;
        if !(duration.is_finite() && duration > 0.0) {
            return Err(ProbeError::InvalidDuration(duration));
        }
        Ok(duration)
    }
}

/// Burns cues into a plain vertical video with FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegVideoRenderer {
    inner: FfmpegSubtitleRenderer,
    audio_extension: String,
}

impl FfmpegVideoRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            inner: FfmpegSubtitleRenderer::new(config),
            audio_extension: DEFAULT_AUDIO_EXTENSION.to_string(),
        }
    }

    pub fn with_audio_extension(mut self, extension: impl Into<String>) -> Self {
        self.audio_extension = extension.into();
        self
    }

    /// Kill in-flight encodes once `cancel_rx` reads `true`.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.inner = self.inner.with_cancel(cancel_rx);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        self.inner.config()
    }
}

#[async_trait]
impl VideoRenderer for FfmpegVideoRenderer {
    async fn render(&self, audio: &AudioBytes, cues: &[Cue]) -> Result<VideoBytes, RenderError> {
        let video = self
            .inner
            .render(audio.as_slice(), &self.audio_extension, cues)
            .await?;
        Ok(VideoBytes(video))
    }
}
