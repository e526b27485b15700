//! Pipeline run identity and stage models.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Non-terminal stages of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    GeneratingScript,
    SynthesizingAudio,
    MeasuringDuration,
    Segmenting,
    Rendering,
    Uploading,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::GeneratingScript,
        PipelineStage::SynthesizingAudio,
        PipelineStage::MeasuringDuration,
        PipelineStage::Segmenting,
        PipelineStage::Rendering,
        PipelineStage::Uploading,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::GeneratingScript => "generating_script",
            PipelineStage::SynthesizingAudio => "synthesizing_audio",
            PipelineStage::MeasuringDuration => "measuring_duration",
            PipelineStage::Segmenting => "segmenting",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Uploading => "uploading",
        }
    }

    /// The stage that follows this one, or `None` after uploading.
    pub fn next(&self) -> Option<PipelineStage> {
        let pos = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(pos + 1).copied()
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
        }
    }
}
