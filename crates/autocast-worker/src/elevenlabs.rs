//! ElevenLabs text-to-speech synthesizer.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use autocast_dispatch::CallError;
use autocast_models::{AudioBytes, Credential};

use crate::error::WorkerResult;
use crate::http::{build_client, call_error_from_reqwest, check_status};
use crate::stages::VoiceSynthesizer;

/// Settings for [`ElevenLabsSynthesizer`].
#[derive(Debug, Clone)]
pub struct ElevenLabsConfig {
    pub base_url: String,
    pub voice_id: String,
    pub model_id: String,
    pub request_timeout: Duration,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.elevenlabs.io/v1".to_string(),
            voice_id: "EXAVITQu4vr4xnSDxMaL".to_string(),
            model_id: "eleven_monolingual_v1".to_string(),
            request_timeout: Duration::from_secs(180),
        }
    }
}

impl ElevenLabsConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ELEVENLABS_BASE_URL").unwrap_or(defaults.base_url),
            voice_id: std::env::var("ELEVENLABS_VOICE_ID").unwrap_or(defaults.voice_id),
            model_id: std::env::var("ELEVENLABS_MODEL_ID").unwrap_or(defaults.model_id),
            request_timeout: defaults.request_timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

/// Text-to-speech client returning MP3 audio.
pub struct ElevenLabsSynthesizer {
    config: ElevenLabsConfig,
    client: Client,
}

impl ElevenLabsSynthesizer {
    pub fn new(config: ElevenLabsConfig) -> WorkerResult<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/text-to-speech/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id
        )
    }
}

#[async_trait]
impl VoiceSynthesizer for ElevenLabsSynthesizer {
    async fn synthesize(&self, text: &str, credential: &Credential) -> Result<AudioBytes, CallError> {
        if text.trim().is_empty() {
            return Err(CallError::bad_request("cannot synthesize empty text"));
        }

        let response = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", credential.expose_secret())
            .header(ACCEPT, "audio/mpeg")
            .json(&SpeechRequest {
                text,
                model_id: &self.config.model_id,
            })
            .send()
            .await
            .map_err(call_error_from_reqwest)?;

        let bytes = check_status(response)
            .await?
            .bytes()
            .await
            .map_err(call_error_from_reqwest)?;

        if bytes.is_empty() {
            return Err(CallError::unknown("speech endpoint returned no audio"));
        }

        debug!(
            credential = %credential.id(),
            voice = %self.config.voice_id,
            bytes = bytes.len(),
            "Synthesized narration"
        );
        Ok(AudioBytes(bytes.to_vec()))
    }
}
