//! OpenAI-compatible chat-completions script generator.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use autocast_dispatch::CallError;
use autocast_models::Credential;

use crate::error::WorkerResult;
use crate::http::{build_client, call_error_from_reqwest, check_status};
use crate::stages::TextGenerator;

/// Settings for [`OpenAiTextGenerator`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub request_timeout: Duration,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4-turbo".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl OpenAiConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            model: std::env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            temperature: std::env::var("OPENAI_TEMPERATURE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.temperature),
            max_tokens: std::env::var("OPENAI_MAX_TOKENS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_tokens),
            request_timeout: defaults.request_timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

/// Chat-completions client.
pub struct OpenAiTextGenerator {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiTextGenerator {
    pub fn new(config: OpenAiConfig) -> WorkerResult<Self> {
        let client = build_client(config.request_timeout)?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn generate(&self, prompt: &str, credential: &Credential) -> Result<String, CallError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(credential.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(call_error_from_reqwest)?;

        let response: ChatResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(call_error_from_reqwest)?;

        if let Some(usage) = &response.usage {
            debug!(
                credential = %credential.id(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "Chat completion token usage"
            );
        }

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(CallError::unknown("chat completion returned no content"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autocast_dispatch::{classify_call_error, CallErrorKind, Classification};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator(server: &MockServer) -> OpenAiTextGenerator {
        OpenAiTextGenerator::new(OpenAiConfig {
            base_url: format!("{}/v1", server.uri()),
            ..Default::default()
        })
        .unwrap()
    }

    fn credential() -> Credential {
        Credential::new("sk-test-secret-0001")
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test-secret-0001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "  Stars are hot. They glow.  "}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 6, "total_tokens": 16}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = generator(&server)
            .generate("stars", &credential())
            .await
            .unwrap();
        assert_eq!(text, "Stars are hot. They glow.");
    }

    #[tokio::test]
    async fn test_quota_response_classified_as_quota() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"code": "insufficient_quota", "message": "You exceeded your current quota"}
            })))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate("stars", &credential())
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::QuotaExceeded);
        assert_eq!(err.status, Some(429));
        assert_eq!(classify_call_error(&err), Classification::Quota);
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate("stars", &credential())
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::ServerError);
        assert_eq!(classify_call_error(&err), Classification::Retryable);
    }

    #[tokio::test]
    async fn test_bad_request_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unknown model"))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate("stars", &credential())
            .await
            .unwrap_err();
        assert_eq!(classify_call_error(&err), Classification::Fatal);
    }

    #[tokio::test]
    async fn test_empty_choices_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = generator(&server)
            .generate("stars", &credential())
            .await
            .unwrap_err();
        assert_eq!(err.kind, CallErrorKind::Unknown);
    }
}
