//! Failure notifiers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{NotifyError, WorkerResult};
use crate::http::build_client;
use crate::report::PipelineFailure;
use crate::stages::Notifier;

/// Posts failure reports to a Slack-compatible incoming webhook.
pub struct WebhookNotifier {
    url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct WebhookMessage {
    text: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> WorkerResult<Self> {
        Ok(Self {
            url: url.into(),
            client: build_client(Duration::from_secs(15))?,
        })
    }

    fn message(failure: &PipelineFailure) -> WebhookMessage {
        WebhookMessage {
            text: format!(":warning: autocast run failed\n{}", failure.report()),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, failure: &PipelineFailure) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Self::message(failure))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        info!(
            run_id = %failure.run_id,
            stage = %failure.stage,
            "Failure notification delivered"
        );
        Ok(())
    }
}

/// Writes failure reports to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, failure: &PipelineFailure) -> Result<(), NotifyError> {
        error!(
            run_id = %failure.run_id,
            stage = %failure.stage,
            category = %failure.category,
            attempts = failure.attempts,
            "{}",
            failure.report()
        );
        Ok(())
    }
}

/// Webhook notifier when a URL is configured, log notifier otherwise.
pub fn notifier_from_config(webhook_url: Option<&str>) -> WorkerResult<Arc<dyn Notifier>> {
    match webhook_url {
        Some(url) => Ok(Arc::new(WebhookNotifier::new(url)?)),
        None => {
            warn!("SLACK_WEBHOOK_URL not set; failures will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PublishError, StageError};
    use autocast_models::{PipelineStage, RunId};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn failure() -> PipelineFailure {
        PipelineFailure::new(
            RunId::from_string("run-42"),
            "deep sea",
            PipelineStage::Uploading,
            4,
            StageError::Publish(PublishError::transient("storage offline")),
        )
    }

    #[tokio::test]
    async fn test_webhook_posts_report() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_string_contains(":warning:"))
            .and(body_string_contains("Stage: uploading"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hook", server.uri())).unwrap();
        notifier.notify(&failure()).await.unwrap();
    }

    #[tokio::test]
    async fn test_webhook_rejection_surfaces_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        let err = notifier.notify(&failure()).await.unwrap_err();
        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no_service");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        assert!(LogNotifier.notify(&failure()).await.is_ok());
    }
}
