//! Duration segmentation.
//!
//! Turns a narration script and the measured length of its audio into
//! contiguous subtitle cues:
//! - the first cue starts at 0 and the last ends at exactly `total`
//! - `cue[i].end == cue[i + 1].start`
//! - every cue lasts at least `min_cue_secs` (unless `total` itself is shorter)
//! - cue texts, in order, contain every sentence of the script exactly once
//!
//! Segmentation is pure and synchronous.

use serde::{Deserialize, Serialize};

use autocast_models::Cue;

use crate::error::SegmentError;

/// Tolerance used when comparing accumulated floating-point offsets.
pub const TIME_EPSILON: f64 = 1e-6;

/// Closing marks that stay attached to the sentence they end.
const CLOSING_MARKS: &[char] = &['"', '\'', ')', ']', '»', '”', '’', '」', '』', '）'];

/// How a cue's share of the total duration is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Proportional to the number of sentences in the cue.
    #[default]
    ChunkCount,
    /// Proportional to the number of non-whitespace characters in the cue.
    CharacterCount,
}

impl std::str::FromStr for AllocationPolicy {
    type Err = SegmentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chunk" | "chunks" | "chunk_count" => Ok(AllocationPolicy::ChunkCount),
            "char" | "chars" | "character" | "character_count" => {
                Ok(AllocationPolicy::CharacterCount)
            }
            other => Err(SegmentError::invalid_input(format!(
                "unknown allocation policy '{}'",
                other
            ))),
        }
    }
}

/// Partitions a script over an audio duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSegmenter {
    /// Minimum cue length in seconds.
    pub min_cue_secs: f64,
    pub allocation: AllocationPolicy,
    /// Text of the single cue produced for an empty script.
    pub placeholder: String,
}

impl Default for DurationSegmenter {
    fn default() -> Self {
        Self {
            min_cue_secs: 0.3,
            allocation: AllocationPolicy::ChunkCount,
            placeholder: "…".to_string(),
        }
    }
}

impl DurationSegmenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_cue_secs(mut self, secs: f64) -> Self {
        self.min_cue_secs = secs;
        self
    }

    pub fn with_allocation(mut self, allocation: AllocationPolicy) -> Self {
        self.allocation = allocation;
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    /// Number of cues to aim for when each should last about `secs_per_cue`.
    pub fn target_for(total: f64, secs_per_cue: f64) -> usize {
        if !(total.is_finite() && secs_per_cue.is_finite()) || total <= 0.0 || secs_per_cue <= 0.0 {
            return 1;
        }
        ((total / secs_per_cue).ceil() as usize).max(1)
    }

    /// Partition `text` into at most `target_segments` cues spanning `[0, total]`.
    pub fn segment(
        &self,
        text: &str,
        total: f64,
        target_segments: usize,
    ) -> Result<Vec<Cue>, SegmentError> {
        if !total.is_finite() || total <= 0.0 {
            return Err(SegmentError::InvalidDuration(total));
        }
        if target_segments == 0 {
            return Err(SegmentError::invalid_input("target segment count must be at least 1"));
        }
        if !self.min_cue_secs.is_finite() || self.min_cue_secs <= 0.0 {
            return Err(SegmentError::invalid_input(format!(
                "minimum cue length must be > 0, got {}",
                self.min_cue_secs
            )));
        }
        if self.placeholder.trim().is_empty() {
            return Err(SegmentError::invalid_input("placeholder text must not be blank"));
        }

        let chunks = split_sentences(text);
        if chunks.is_empty() {
            return Ok(vec![Cue::new(1, self.placeholder.clone(), 0.0, total)]);
        }

        let n = chunks.len();
        let mut k = n.min(target_segments);
        let fits = ((total / self.min_cue_secs) + TIME_EPSILON).floor() as usize;
        if fits < k {
            k = fits.max(1);
        }

        let groups: Vec<String> = (0..k)
            .map(|i| {
                let start = i * n / k;
                let end = (i + 1) * n / k;
                chunks[start..end].join(" ")
            })
            .collect();

        let weights: Vec<f64> = match self.allocation {
            AllocationPolicy::ChunkCount => (0..k)
                .map(|i| ((i + 1) * n / k - i * n / k) as f64)
                .collect(),
            AllocationPolicy::CharacterCount => groups
                .iter()
                .map(|g| g.chars().filter(|c| !c.is_whitespace()).count().max(1) as f64)
                .collect(),
        };

        let durations = allocate(&weights, total, self.min_cue_secs);

        let mut cues = Vec::with_capacity(k);
        let mut start = 0.0;
        for (i, (text, duration)) in groups.into_iter().zip(durations).enumerate() {
            let end = if i + 1 == k { total } else { start + duration };
            cues.push(Cue::new((i + 1) as u32, text, start, end));
            start = end;
        }

        Ok(cues)
    }
}

/// Split durations proportionally to `weights`, lifting any share below
/// `min` to exactly `min` and re-spreading the remainder over the rest.
///
/// Requires `weights.len() * min <= total` when there is more than one weight.
fn allocate(weights: &[f64], total: f64, min: f64) -> Vec<f64> {
    let k = weights.len();
    if k == 1 {
        return vec![total];
    }

    let mut pinned = vec![false; k];
    let mut durations = vec![0.0; k];

    loop {
        let pinned_count = pinned.iter().filter(|p| **p).count();
        let remaining = total - pinned_count as f64 * min;
        let free_weight: f64 = weights
            .iter()
            .zip(&pinned)
            .filter(|(_, p)| !**p)
            .map(|(w, _)| *w)
            .sum();

        for i in 0..k {
            durations[i] = if pinned[i] {
                min
            } else {
                remaining * weights[i] / free_weight
            };
        }

        let mut changed = false;
        for i in 0..k {
            if !pinned[i] && durations[i] < min {
                pinned[i] = true;
                changed = true;
            }
        }

        // All pinned can only happen when k * min == total.
        if !changed || pinned.iter().all(|p| *p) {
            if pinned.iter().all(|p| *p) {
                durations.iter_mut().for_each(|d| *d = total / k as f64);
            }
            return durations;
        }
    }
}

/// Split text at sentence boundaries, trimming and dropping empty chunks.
///
/// `.`, `!`, `?` and `…` end a sentence when followed by whitespace or the
/// end of the text; full-width `。！？` always end one.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut iter = text.char_indices().peekable();

    while let Some((i, c)) = iter.next() {
        if !is_terminal(c) {
            continue;
        }

        let mut fullwidth = is_fullwidth_terminal(c);
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = iter.peek() {
            if is_terminal(next) || CLOSING_MARKS.contains(&next) {
                fullwidth |= is_fullwidth_terminal(next);
                end = j + next.len_utf8();
                iter.next();
            } else {
                break;
            }
        }

        let at_boundary = fullwidth
            || match iter.peek() {
                None => true,
                Some(&(_, next)) => next.is_whitespace(),
            };

        if at_boundary {
            push_trimmed(&mut chunks, &text[start..end]);
            start = end;
        }
    }

    push_trimmed(&mut chunks, &text[start..]);
    chunks
}

fn push_trimmed<'a>(chunks: &mut Vec<&'a str>, chunk: &'a str) {
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
}

fn is_terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…') || is_fullwidth_terminal(c)
}

fn is_fullwidth_terminal(c: char) -> bool {
    matches!(c, '。' | '！' | '？' | '｡')
}

/// Check the cue-sequence invariants against `total`.
///
/// Cues shorter than `min_cue_secs` are accepted only for a single cue
/// spanning a `total` that is itself shorter.
pub fn validate_cues(cues: &[Cue], total: f64, min_cue_secs: f64) -> Result<(), SegmentError> {
    let Some(first) = cues.first() else {
        return Err(SegmentError::invalid_input("cue sequence is empty"));
    };
    if first.start.abs() > TIME_EPSILON {
        return Err(SegmentError::invalid_input(format!(
            "first cue starts at {} instead of 0",
            first.start
        )));
    }

    for (i, cue) in cues.iter().enumerate() {
        if cue.index as usize != i + 1 {
            return Err(SegmentError::invalid_input(format!(
                "cue #{} has index {}",
                i + 1,
                cue.index
            )));
        }
        if cue.text.trim().is_empty() {
            return Err(SegmentError::invalid_input(format!("cue #{} has empty text", cue.index)));
        }
        if cue.end <= cue.start {
            return Err(SegmentError::invalid_input(format!(
                "cue #{} ends at {} but starts at {}",
                cue.index, cue.end, cue.start
            )));
        }
        let single_short = cues.len() == 1 && total < min_cue_secs;
        if !single_short && cue.duration() + TIME_EPSILON < min_cue_secs {
            return Err(SegmentError::invalid_input(format!(
                "cue #{} lasts {:.3}s, below the {:.3}s minimum",
                cue.index,
                cue.duration(),
                min_cue_secs
            )));
        }
        if let Some(next) = cues.get(i + 1) {
            if (next.start - cue.end).abs() > TIME_EPSILON {
                return Err(SegmentError::invalid_input(format!(
                    "gap or overlap between cue #{} and #{}",
                    cue.index, next.index
                )));
            }
        }
    }

    let last_end = cues[cues.len() - 1].end;
    if (last_end - total).abs() > TIME_EPSILON {
        return Err(SegmentError::invalid_input(format!(
            "last cue ends at {} instead of {}",
            last_end, total
        )));
    }

    Ok(())
}
