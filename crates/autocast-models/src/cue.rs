//! Timed subtitle cue.

use serde::{Deserialize, Serialize};

/// One timed subtitle segment with offsets (in seconds) into the audio track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// 1-based, contiguous position within the track
    pub index: u32,
    /// Non-empty cue text
    pub text: String,
    /// Start offset in seconds
    pub start: f64,
    /// End offset in seconds (always greater than `start`)
    pub end: f64,
}

impl Cue {
    pub fn new(index: u32, text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            index,
            text: text.into(),
            start,
            end,
        }
    }

    /// Cue length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}
