//! Narrated video pipeline worker.
//!
//! This crate provides:
//! - Collaborator traits and the stage-by-stage pipeline orchestrator
//! - Structured failure reports and notifiers
//! - Concurrent topic batches with graceful shutdown
//! - HTTP text/voice providers, FFmpeg media stages and a directory publisher

pub mod batch;
pub mod config;
pub mod elevenlabs;
pub mod error;
pub mod http;
pub mod logging;
pub mod media_stages;
pub mod metrics;
pub mod notifier;
pub mod openai;
pub mod pipeline;
pub mod publisher;
pub mod report;
pub mod retry;
pub mod setup;
pub mod stages;

pub use batch::{BatchReport, BatchRunner};
pub use config::WorkerConfig;
pub use error::{
    NotifyError, ProbeError, PublishError, RenderError, StageError, WorkerError, WorkerResult,
};
pub use logging::RunLogger;
pub use pipeline::{Collaborators, PipelineConfig, PipelineOrchestrator, RunRequest};
pub use report::{FailureCategory, PipelineFailure, RunSummary};
pub use setup::{build_orchestrator, CredentialPools};
pub use stages::{DurationProbe, Notifier, Publisher, TextGenerator, VideoRenderer, VoiceSynthesizer};
