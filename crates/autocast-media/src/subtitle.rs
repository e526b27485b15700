//! Subtitle file serialization (SRT and WebVTT).

use std::path::Path;

use autocast_models::{format_srt_timestamp, format_vtt_timestamp, Cue};

use crate::error::MediaResult;

/// Default maximum characters per subtitle line.
pub const DEFAULT_LINE_WIDTH: usize = 42;

/// Subtitle container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubtitleFormat {
    Srt,
    WebVtt,
}

impl SubtitleFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SubtitleFormat::Srt => "srt",
            SubtitleFormat::WebVtt => "vtt",
        }
    }

    /// Serialize cues, wrapping text at `line_width` characters.
    pub fn render(&self, cues: &[Cue], line_width: usize) -> String {
        match self {
            SubtitleFormat::Srt => to_srt(cues, line_width),
            SubtitleFormat::WebVtt => to_webvtt(cues, line_width),
        }
    }
}

/// Serialize cues as SRT.
pub fn to_srt(cues: &[Cue], line_width: usize) -> String {
    let mut out = String::new();
    for cue in cues {
        out.push_str(&cue.index.to_string());
        out.push('\n');
        out.push_str(&format_srt_timestamp(cue.start));
        out.push_str(" --> ");
        out.push_str(&format_srt_timestamp(cue.end));
        out.push('\n');
        out.push_str(&wrap_text(&cue.text, line_width).join("\n"));
        out.push_str("\n\n");
    }
    out
}

/// Serialize cues as WebVTT.
pub fn to_webvtt(cues: &[Cue], line_width: usize) -> String {
    let mut out = String::from("WEBVTT\n\n");
    for cue in cues {
        out.push_str(&cue.index.to_string());
        out.push('\n');
        out.push_str(&format_vtt_timestamp(cue.start));
        out.push_str(" --> ");
        out.push_str(&format_vtt_timestamp(cue.end));
        out.push('\n');
        // "-->" inside a payload would end the cue early.
        let text = cue.text.replace("-->", "->");
        out.push_str(&wrap_text(&text, line_width).join("\n"));
        out.push_str("\n\n");
    }
    out
}

/// Greedy word wrap by character count. Words longer than `width` get
/// a line of their own; `width == 0` disables wrapping.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if width == 0 {
        return vec![words.join(" ")];
    }

    let mut lines = Vec::new();
    let mut line = String::new();
    let mut line_len = 0;

    for word in words {
        let word_len = word.chars().count();
        if line_len > 0 && line_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut line));
            line_len = 0;
        }
        if line_len > 0 {
            line.push(' ');
            line_len += 1;
        }
        line.push_str(word);
        line_len += word_len;
    }

    if !line.is_empty() || lines.is_empty() {
        lines.push(line);
    }
    lines
}

/// Write cues to `path` in the given format.
pub async fn write_subtitles(
    path: impl AsRef<Path>,
    cues: &[Cue],
    format: SubtitleFormat,
    line_width: usize,
) -> MediaResult<()> {
    tokio::fs::write(path.as_ref(), format.render(cues, line_width)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cues() -> Vec<Cue> {
        vec![
            Cue::new(1, "Hello world.", 0.0, 1.5),
            Cue::new(2, "This is a test.", 1.5, 3.25),
        ]
    }

    #[test]
    fn test_srt_output() {
        let srt = to_srt(&cues(), DEFAULT_LINE_WIDTH);
        assert_eq!(
            srt,
            "1\n00:00:00,000 --> 00:00:01,500\nHello world.\n\n\
             2\n00:00:01,500 --> 00:00:03,250\nThis is a test.\n\n"
        );
    }

    #[test]
    fn test_webvtt_output() {
        let vtt = to_webvtt(&cues(), DEFAULT_LINE_WIDTH);
        assert!(vtt.starts_with("WEBVTT\n\n1\n00:00:00.000 --> 00:00:01.500\n"));
        assert!(vtt.contains("00:00:01.500 --> 00:00:03.250\nThis is a test."));
    }

    #[test]
    fn test_webvtt_escapes_arrow() {
        let vtt = to_webvtt(&[Cue::new(1, "a --> b", 0.0, 1.0)], 0);
        assert!(vtt.ends_with("a -> b\n\n"));
    }

    #[test]
    fn test_wrap_text() {
        assert_eq!(
            wrap_text("the quick brown fox jumps", 10),
            vec!["the quick", "brown fox", "jumps"]
        );
        assert_eq!(wrap_text("supercalifragilistic word", 5), vec!["supercalifragilistic", "word"]);
        assert_eq!(wrap_text("  spaced   out  ", 0), vec!["spaced out"]);
        assert_eq!(wrap_text("", 10), vec![""]);
    }

    #[test]
    fn test_wrap_counts_chars_not_bytes() {
        assert_eq!(wrap_text("héllo wörld", 11), vec!["héllo wörld"]);
    }

    #[tokio::test]
    async fn test_write_subtitles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.srt");
        write_subtitles(&path, &cues(), SubtitleFormat::Srt, 42).await.unwrap();
        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(content.starts_with("1\n00:00:00,000"));
        assert_eq!(SubtitleFormat::WebVtt.extension(), "vtt");
    }
}
