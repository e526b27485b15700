//! Minimal narrated-video renderer.
//!
//! Produces a solid-colour vertical video carrying the narration audio and
//! the cues burned in as subtitles.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{debug, info};

use autocast_models::Cue;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult, SegmentError};
use crate::fs_utils::scratch_dir;
use crate::subtitle::{write_subtitles, SubtitleFormat, DEFAULT_LINE_WIDTH};

/// Output settings for [`FfmpegSubtitleRenderer`].
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    /// FFmpeg colour name or `0xRRGGBB`.
    pub background: String,
    pub font_size: u32,
    /// Characters per subtitle line.
    pub line_width: usize,
    pub crf: u8,
    pub preset: String,
    pub audio_bitrate: String,
    pub timeout_secs: u64,
    /// Parent of the per-render scratch directories.
    pub work_dir: PathBuf,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 1280,
            background: "black".to_string(),
            font_size: 18,
            line_width: DEFAULT_LINE_WIDTH,
            crf: 23,
            preset: "veryfast".to_string(),
            audio_bitrate: "128k".to_string(),
            timeout_secs: 600,
            work_dir: std::env::temp_dir(),
        }
    }
}

impl RenderConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            width: env_parse("RENDER_WIDTH").unwrap_or(defaults.width),
            height: env_parse("RENDER_HEIGHT").unwrap_or(defaults.height),
            background: std::env::var("RENDER_BACKGROUND").unwrap_or(defaults.background),
            font_size: env_parse("RENDER_FONT_SIZE").unwrap_or(defaults.font_size),
            line_width: env_parse("SUBTITLE_LINE_WIDTH").unwrap_or(defaults.line_width),
            crf: env_parse("RENDER_CRF").unwrap_or(defaults.crf),
            preset: std::env::var("RENDER_PRESET").unwrap_or(defaults.preset),
            audio_bitrate: defaults.audio_bitrate,
            timeout_secs: env_parse("RENDER_TIMEOUT_SECS").unwrap_or(defaults.timeout_secs),
            work_dir: defaults.work_dir,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Renders audio plus cues into an MP4 with FFmpeg.
#[derive(Debug, Clone, Default)]
pub struct FfmpegSubtitleRenderer {
    config: RenderConfig,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl FfmpegSubtitleRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            cancel_rx: None,
        }
    }

    /// Set cancellation signal; passed to the FFmpeg runner.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Render `audio` (encoded as `audio_ext`) with `cues` burned in.
    ///
    /// The video lasts until the end of the last cue.
    pub async fn render(&self, audio: &[u8], audio_ext: &str, cues: &[Cue]) -> MediaResult<Vec<u8>> {
        let duration = match cues.last() {
            Some(cue) if cue.end > 0.0 => cue.end,
            _ => {
                return Err(SegmentError::invalid_input("cannot render without cues").into());
            }
        };
        if audio.is_empty() {
            return Err(MediaError::invalid_media("audio payload is empty"));
        }

        let work_dir = scratch_dir(&self.config.work_dir, "autocast-render-").await?;
        let audio_path = work_dir
            .path()
            .join(format!("narration.{}", audio_ext.trim_start_matches('.')));
        let subs_path = work_dir.path().join("cues.srt");
        let output_path = work_dir.path().join("video.mp4");

        tokio::fs::write(&audio_path, audio).await?;
        write_subtitles(&subs_path, cues, SubtitleFormat::Srt, self.config.line_width).await?;

        let cmd = self.build_command(&audio_path, &subs_path, &output_path, duration);
        let mut runner = FfmpegRunner::new().with_timeout(self.config.timeout_secs);
        if let Some(rx) = &self.cancel_rx {
            runner = runner.with_cancel(rx.clone());
        }

        info!(cues = cues.len(), duration, "Rendering video");
        runner.run(&cmd).await?;

        let video = tokio::fs::read(&output_path).await?;
        if video.is_empty() {
            return Err(MediaError::ffmpeg_failed("FFmpeg produced an empty file", None, None));
        }
        debug!(bytes = video.len(), "Rendered video");
        Ok(video)
    }

    fn build_command(&self, audio: &Path, subs: &Path, output: &Path, duration: f64) -> FfmpegCommand {
        let c = &self.config;
        let filter = format!(
            "subtitles='{}':force_style='Fontsize={},Alignment=2,MarginV=40'",
            escape_filter_path(subs),
            c.font_size
        );

        FfmpegCommand::new(output)
            .color_source(&c.background, c.width, c.height, duration)
            .input(audio)
            .map("0:v")
            .map("1:a")
            .video_filter(filter)
            .video_codec("libx264")
            .preset(c.preset.clone())
            .crf(c.crf)
            .output_args(["-pix_fmt", "yuv420p"])
            .audio_codec("aac")
            .audio_bitrate(c.audio_bitrate.clone())
            .shortest()
    }
}

/// Escape a path for use inside a quoted filtergraph argument.
fn escape_filter_path(path: &Path) -> String {
    let mut out = String::new();
    for ch in path.to_string_lossy().chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("'\\''"),
            ':' => out.push_str("\\:"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("/tmp/a.srt")), "/tmp/a.srt");
        assert_eq!(escape_filter_path(Path::new("C:\\x'y.srt")), "C\\:\\\\x'\\''y.srt");
    }

    #[test]
    fn test_command_layout() {
        let renderer = FfmpegSubtitleRenderer::default();
        let args = renderer
            .build_command(
                Path::new("/w/narration.mp3"),
                Path::new("/w/cues.srt"),
                Path::new("/w/video.mp4"),
                9.5,
            )
            .build_args();

        assert!(args.contains(&"color=c=black:s=720x1280:d=9.500".to_string()));
        assert!(args.contains(&"/w/narration.mp3".to_string()));
        assert!(args.iter().any(|a| a.starts_with("subtitles='/w/cues.srt'")));
        assert_eq!(args.last().unwrap(), "/w/video.mp4");
    }

    #[tokio::test]
    async fn test_render_requires_cues() {
        let err = FfmpegSubtitleRenderer::default()
            .render(b"fake", "mp3", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Segment(_)));
    }

    #[tokio::test]
    async fn test_render_requires_audio() {
        let cues = vec![Cue::new(1, "Hi.", 0.0, 1.0)];
        let err = FfmpegSubtitleRenderer::default()
            .render(&[], "mp3", &cues)
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::InvalidMedia(_)));
    }

    #[tokio::test]
    async fn test_render_scratch_space_lives_in_work_dir() {
        let root = tempfile::tempdir().unwrap();
        let work_dir = root.path().join("renders");
        let renderer = FfmpegSubtitleRenderer::new(
            RenderConfig {
                timeout_secs: 10,
                ..Default::default()
            }
            .with_work_dir(&work_dir),
        );
        let cues = vec![Cue::new(1, "Hi.", 0.0, 1.0)];

        // FFmpeg rejects the payload or is missing; either way the scratch dir is gone.
        let _ = renderer.render(b"not audio", "mp3", &cues).await;

        assert!(work_dir.is_dir());
        assert_eq!(std::fs::read_dir(&work_dir).unwrap().count(), 0);
    }
}
