//! Subtitle timing and FFmpeg CLI wrapper.
//!
//! This crate provides:
//! - Duration segmentation of a script into contiguous subtitle cues
//! - SRT / WebVTT serialization
//! - FFprobe duration measurement
//! - FFmpeg command building with timeout and cancellation
//! - A minimal subtitle-burning renderer

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod render;
pub mod segment;
pub mod subtitle;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult, SegmentError};
pub use fs_utils::{scratch_dir, scratch_file};
pub use probe::{probe_duration, probe_duration_bytes};
pub use render::{FfmpegSubtitleRenderer, RenderConfig};
pub use segment::{split_sentences, validate_cues, AllocationPolicy, DurationSegmenter, TIME_EPSILON};
pub use subtitle::{to_srt, to_webvtt, wrap_text, write_subtitles, SubtitleFormat, DEFAULT_LINE_WIDTH};
