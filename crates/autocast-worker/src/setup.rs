//! Production wiring from environment configuration.

use std::sync::Arc;

use tokio::sync::watch;

use autocast_dispatch::{CooldownConfig, CredentialFormat, CredentialPool, RetryExecutor, RetryPolicy};
use autocast_media::RenderConfig;

use crate::config::WorkerConfig;
use crate::elevenlabs::{ElevenLabsConfig, ElevenLabsSynthesizer};
use crate::error::WorkerResult;
use crate::media_stages::{FfmpegVideoRenderer, FfprobeDurationProbe};
use crate::notifier::notifier_from_config;
use crate::openai::{OpenAiConfig, OpenAiTextGenerator};
use crate::pipeline::{Collaborators, PipelineConfig, PipelineOrchestrator};
use crate::publisher::DirectoryPublisher;

pub const OPENAI_KEYS_VAR: &str = "OPENAI_API_KEYS";
pub const ELEVENLABS_KEYS_VAR: &str = "ELEVENLABS_API_KEYS";

/// Credential pools for the two credentialed stages.
#[derive(Debug, Clone)]
pub struct CredentialPools {
    pub text: Arc<CredentialPool>,
    pub voice: Arc<CredentialPool>,
}

impl CredentialPools {
    /// Load both pools; fails on a missing, empty or malformed list.
    pub fn from_env() -> WorkerResult<Self> {
        let text = CredentialPool::from_env(
            "openai",
            OPENAI_KEYS_VAR,
            &CredentialFormat::with_prefix("sk-"),
            CooldownConfig::from_env("OPENAI"),
        )?;
        let voice = CredentialPool::from_env(
            "elevenlabs",
            ELEVENLABS_KEYS_VAR,
            &CredentialFormat::default(),
            CooldownConfig::from_env("ELEVENLABS"),
        )?;
        Ok(Self {
            text: Arc::new(text),
            voice: Arc::new(voice),
        })
    }
}

/// Build the orchestrator with the HTTP, FFmpeg and directory collaborators.
///
/// `shutdown_rx` additionally kills in-flight encodes on process shutdown.
pub fn build_orchestrator(
    config: &WorkerConfig,
    pools: &CredentialPools,
    shutdown_rx: watch::Receiver<bool>,
) -> WorkerResult<PipelineOrchestrator> {
    let text_executor = RetryExecutor::new(
        "generate_script",
        Arc::clone(&pools.text),
        RetryPolicy::from_env("OPENAI"),
    );
    let voice_executor = RetryExecutor::new(
        "synthesize_voice",
        Arc::clone(&pools.voice),
        RetryPolicy::from_env("ELEVENLABS"),
    );

    let collaborators = Collaborators {
        text: Arc::new(OpenAiTextGenerator::new(OpenAiConfig::from_env())?),
        voice: Arc::new(ElevenLabsSynthesizer::new(ElevenLabsConfig::from_env())?),
        probe: Arc::new(FfprobeDurationProbe::default().with_work_dir(&config.work_dir)),
        renderer: Arc::new(
            FfmpegVideoRenderer::new(RenderConfig::from_env().with_work_dir(&config.work_dir))
                .with_cancel(shutdown_rx),
        ),
        publisher: Arc::new(DirectoryPublisher::new(&config.output_dir)),
        notifier: notifier_from_config(config.slack_webhook_url.as_deref())?,
    };

    Ok(PipelineOrchestrator::new(
        text_executor,
        voice_executor,
        collaborators,
        PipelineConfig::from_worker_config(config),
    ))
}
