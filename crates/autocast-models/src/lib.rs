//! Shared data models for the autocast pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Subtitle cues produced by the duration segmenter
//! - API credentials and their masked identities
//! - Pipeline runs, stages and publish metadata
//! - Subtitle timestamp formatting

pub mod credential;
pub mod cue;
pub mod media;
pub mod publish;
pub mod run;
pub mod timestamp;

// Re-export common types
pub use credential::{Credential, CredentialId};
pub use cue::Cue;
pub use media::{AudioBytes, VideoBytes};
pub use publish::{PublishMetadata, PublishedVideoId, MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS};
pub use run::{PipelineStage, RunId, RunStatus};
pub use timestamp::{format_srt_timestamp, format_vtt_timestamp};
