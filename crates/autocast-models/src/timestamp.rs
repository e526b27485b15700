//! Subtitle timestamp formatting.
//!
//! SRT uses `HH:MM:SS,mmm`, WebVTT uses `HH:MM:SS.mmm`. Both round to
//! the nearest millisecond; negative or non-finite input clamps to zero.

/// Format seconds as an SRT timestamp (`00:01:02,345`).
pub fn format_srt_timestamp(seconds: f64) -> String {
    format_with_separator(seconds, ',')
}

/// Format seconds as a WebVTT timestamp (`00:01:02.345`).
pub fn format_vtt_timestamp(seconds: f64) -> String {
    format_with_separator(seconds, '.')
}

fn format_with_separator(seconds: f64, sep: char) -> String {
    let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
    let total_ms = (seconds * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    let s = total_secs % 60;
    let total_mins = total_secs / 60;
    let m = total_mins % 60;
    let h = total_mins / 60;
    format!("{:02}:{:02}:{:02}{}{:03}", h, m, s, sep, ms)
}
