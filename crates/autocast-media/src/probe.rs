//! FFprobe duration measurement.

use std::path::Path;
use std::process::Stdio;

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::command::check_ffprobe;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::scratch_file;

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
}

/// Probe a media file for its duration in seconds.
pub async fn probe_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::ffprobe_failed(
            "FFprobe failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
        ));
    }

    let duration = parse_duration(&output.stdout)?;
    debug!(path = %path.display(), duration, "Probed media duration");
    Ok(duration)
}

/// Write `bytes` to a scratch file under `work_dir` and probe it.
///
/// `extension` (e.g. `mp3`) helps ffprobe pick a demuxer.
pub async fn probe_duration_bytes(
    work_dir: impl AsRef<Path>,
    bytes: &[u8],
    extension: &str,
) -> MediaResult<f64> {
    if bytes.is_empty() {
        return Err(MediaError::invalid_media("audio payload is empty"));
    }

    let suffix = format!(".{}", extension.trim_start_matches('.'));
    let file = scratch_file(work_dir, "autocast-probe-", &suffix, bytes).await?;

    probe_duration(file.path()).await
}

/// Extract a positive duration from ffprobe JSON, preferring the container
/// duration and falling back to the longest audio/video stream.
fn parse_duration(stdout: &[u8]) -> MediaResult<f64> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let from_format = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_seconds);

    let from_streams = probe
        .streams
        .iter()
        .filter(|s| matches!(s.codec_type.as_deref(), Some("audio") | Some("video")))
        .filter_map(|s| s.duration.as_deref().and_then(parse_seconds))
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    from_format
        .or(from_streams)
        .ok_or_else(|| MediaError::invalid_media("no positive duration reported by ffprobe"))
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}
