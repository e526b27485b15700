//! End-to-end orchestrator and batch tests with in-memory collaborators.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_test::assert_ok;

use autocast_dispatch::{
    CallError, CooldownConfig, CredentialPool, DispatchError, RetryExecutor, RetryPolicy,
};
use autocast_models::{
    AudioBytes, Credential, Cue, PipelineStage, PublishMetadata, PublishedVideoId, VideoBytes,
};
use autocast_worker::retry::RetryConfig;
use autocast_worker::{
    BatchRunner, Collaborators, DurationProbe, FailureCategory, Notifier, NotifyError,
    PipelineConfig, PipelineFailure, PipelineOrchestrator, ProbeError, PublishError, Publisher,
    RenderError, RunRequest, StageError, TextGenerator, VideoRenderer, VoiceSynthesizer,
};

const SCRIPT: &str = "Octopuses have three hearts. Their blood is blue. They can taste with their arms.";

// =============================================================================
// Fakes
// =============================================================================

type Respond<T, E> = Box<dyn Fn(u32) -> Result<T, E> + Send + Sync>;

struct FakeText {
    calls: AtomicU32,
    respond: Respond<String, CallError>,
}

#[async_trait]
impl TextGenerator for FakeText {
    async fn generate(&self, _prompt: &str, _credential: &Credential) -> Result<String, CallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(call)
    }
}

struct FakeVoice {
    calls: AtomicU32,
    respond: Respond<AudioBytes, CallError>,
}

#[async_trait]
impl VoiceSynthesizer for FakeVoice {
    async fn synthesize(&self, _text: &str, _credential: &Credential) -> Result<AudioBytes, CallError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(call)
    }
}

struct FakeProbe {
    respond: Respond<f64, ProbeError>,
}

#[async_trait]
impl DurationProbe for FakeProbe {
    async fn measure(&self, _audio: &AudioBytes) -> Result<f64, ProbeError> {
        (self.respond)(0)
    }
}

#[derive(Default)]
struct FakeRenderer {
    delay: Duration,
    fail: bool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cues: Mutex<Vec<Cue>>,
}

#[async_trait]
impl VideoRenderer for FakeRenderer {
    async fn render(&self, _audio: &AudioBytes, cues: &[Cue]) -> Result<VideoBytes, RenderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail {
            return Err(RenderError::Failed("encoder exited with status 1".to_string()));
        }
        *self.cues.lock().unwrap() = cues.to_vec();
        Ok(VideoBytes(vec![0; 32]))
    }
}

struct FakePublisher {
    calls: AtomicU32,
    respond: Respond<PublishedVideoId, PublishError>,
}

#[async_trait]
impl Publisher for FakePublisher {
    async fn publish(
        &self,
        _video: &VideoBytes,
        _metadata: &PublishMetadata,
    ) -> Result<PublishedVideoId, PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.respond)(call)
    }
}

#[derive(Default)]
struct RecordingNotifier {
    fail: bool,
    seen: Mutex<Vec<(PipelineStage, FailureCategory, u32)>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, failure: &PipelineFailure) -> Result<(), NotifyError> {
        self.seen
            .lock()
            .unwrap()
            .push((failure.stage, failure.category, failure.attempts));
        if self.fail {
            return Err(NotifyError::Rejected {
                status: 500,
                body: "webhook down".to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    text: Arc<FakeText>,
    voice: Arc<FakeVoice>,
    probe: Arc<FakeProbe>,
    renderer: Arc<FakeRenderer>,
    publisher: Arc<FakePublisher>,
    notifier: Arc<RecordingNotifier>,
    text_keys: usize,
    voice_keys: usize,
    config: PipelineConfig,
}

fn fake_text(respond: impl Fn(u32) -> Result<String, CallError> + Send + Sync + 'static) -> Arc<FakeText> {
    Arc::new(FakeText {
        calls: AtomicU32::new(0),
        respond: Box::new(respond),
    })
}

fn fake_voice(
    respond: impl Fn(u32) -> Result<AudioBytes, CallError> + Send + Sync + 'static,
) -> Arc<FakeVoice> {
    Arc::new(FakeVoice {
        calls: AtomicU32::new(0),
        respond: Box::new(respond),
    })
}

fn fake_probe(respond: impl Fn(u32) -> Result<f64, ProbeError> + Send + Sync + 'static) -> Arc<FakeProbe> {
    Arc::new(FakeProbe {
        respond: Box::new(respond),
    })
}

fn fake_publisher(
    respond: impl Fn(u32) -> Result<PublishedVideoId, PublishError> + Send + Sync + 'static,
) -> Arc<FakePublisher> {
    Arc::new(FakePublisher {
        calls: AtomicU32::new(0),
        respond: Box::new(respond),
    })
}

impl Harness {
    fn new() -> Self {
        Self {
            text: fake_text(|_| Ok(SCRIPT.to_string())),
            voice: fake_voice(|_| Ok(AudioBytes(vec![0xFF; 64]))),
            probe: fake_probe(|_| Ok(12.0)),
            renderer: Arc::new(FakeRenderer::default()),
            publisher: fake_publisher(|call| Ok(PublishedVideoId::from_string(format!("vid-{}", call)))),
            notifier: Arc::new(RecordingNotifier::default()),
            text_keys: 2,
            voice_keys: 2,
            config: PipelineConfig {
                publish_retry: RetryConfig::new("publish").with_base_delay(Duration::from_millis(10)),
                ..Default::default()
            },
        }
    }

    fn text(mut self, respond: impl Fn(u32) -> Result<String, CallError> + Send + Sync + 'static) -> Self {
        self.text = fake_text(respond);
        self
    }

    fn voice(
        mut self,
        respond: impl Fn(u32) -> Result<AudioBytes, CallError> + Send + Sync + 'static,
    ) -> Self {
        self.voice = fake_voice(respond);
        self
    }

    fn probe(mut self, respond: impl Fn(u32) -> Result<f64, ProbeError> + Send + Sync + 'static) -> Self {
        self.probe = fake_probe(respond);
        self
    }

    fn publisher(
        mut self,
        respond: impl Fn(u32) -> Result<PublishedVideoId, PublishError> + Send + Sync + 'static,
    ) -> Self {
        self.publisher = fake_publisher(respond);
        self
    }

    fn executor(name: &str, keys: usize, policy: RetryPolicy) -> RetryExecutor {
        let credentials = (0..keys)
            .map(|i| Credential::new(format!("{}-test-secret-{:04}", name, i)))
            .collect();
        let pool = CredentialPool::new(name, credentials, CooldownConfig::default()).unwrap();
        RetryExecutor::new(name, Arc::new(pool), policy)
    }

    fn build(&self) -> PipelineOrchestrator {
        let policy = RetryPolicy::default()
            .with_max_attempts(3)
            .with_base_delay(Duration::from_millis(50))
            .without_jitter();

        PipelineOrchestrator::new(
            Self::executor("openai", self.text_keys, policy.clone()),
            Self::executor("elevenlabs", self.voice_keys, policy),
            Collaborators {
                text: self.text.clone(),
                voice: self.voice.clone(),
                probe: self.probe.clone(),
                renderer: self.renderer.clone(),
                publisher: self.publisher.clone(),
                notifier: self.notifier.clone(),
            },
            self.config.clone(),
        )
    }
}

/// A receiver that never reads `true`.
fn not_cancelled() -> watch::Receiver<bool> {
    watch::channel(false).1
}

// =============================================================================
// Orchestrator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_run_publishes_video() {
    let harness = Harness::new();
    let orchestrator = harness.build();

    let summary = assert_ok!(
        orchestrator
            .run(RunRequest::new("octopuses", "prompt"), not_cancelled())
            .await
    );

    assert_eq!(summary.topic, "octopuses");
    assert_eq!(summary.video_id.as_str(), "vid-0");
    assert_eq!(summary.audio_duration, 12.0);
    assert_eq!(summary.cue_count, 3);
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 1);
    assert!(harness.notifier.seen.lock().unwrap().is_empty());

    let cues = harness.renderer.cues.lock().unwrap().clone();
    assert_eq!(cues.first().map(|c| c.start), Some(0.0));
    assert_eq!(cues.last().map(|c| c.end), Some(12.0));
    for pair in cues.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
}

#[tokio::test(start_paused = true)]
async fn test_script_outage_reports_transient_with_attempts() {
    let harness = Harness::new().text(|_| Err(CallError::server_error("upstream 503").with_status(503)));
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::GeneratingScript);
    assert_eq!(failure.category, FailureCategory::Transient);
    assert_eq!(failure.attempts, 3);
    assert!(matches!(
        failure.source,
        StageError::Dispatch(DispatchError::RetriesExhausted {
            attempts: 3,
            distinct_credentials: 2,
            ..
        })
    ));
    assert_eq!(harness.voice.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        *harness.notifier.seen.lock().unwrap(),
        vec![(PipelineStage::GeneratingScript, FailureCategory::Transient, 3)]
    );
}

#[tokio::test(start_paused = true)]
async fn test_malformed_request_fails_once() {
    let harness = Harness::new().text(|_| Err(CallError::bad_request("prompt too long").with_status(400)));
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.category, FailureCategory::InvalidInput);
    assert_eq!(failure.attempts, 1);
    assert_eq!(harness.text.calls.load(Ordering::SeqCst), 1);
    assert!(failure.report().contains("HTTP 400"));
}

#[tokio::test(start_paused = true)]
async fn test_spent_voice_credential_reports_credentials() {
    let mut harness = Harness::new().voice(|_| Err(CallError::quota_exceeded("character quota spent")));
    harness.voice_keys = 1;
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::SynthesizingAudio);
    assert_eq!(failure.category, FailureCategory::Credentials);
    assert_eq!(failure.attempts, 1);
    assert!(matches!(
        failure.source,
        StageError::Dispatch(DispatchError::PoolExhausted { size: 1, .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_keys_report_credentials_when_attempts_run_out() {
    let mut harness =
        Harness::new().text(|_| Err(CallError::from_http_status(401, "invalid api key")));
    harness.text_keys = 5;
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::GeneratingScript);
    assert_eq!(failure.category, FailureCategory::Credentials);
    assert_eq!(failure.attempts, 3);
    assert!(matches!(
        failure.source,
        StageError::Dispatch(DispatchError::RetriesExhausted {
            attempts: 3,
            distinct_credentials: 3,
            ..
        })
    ));
    assert_eq!(harness.text.calls.load(Ordering::SeqCst), 3);
    assert!(failure.report().contains("Category: credentials"));
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_stops_before_segmenting() {
    let harness = Harness::new().probe(|_| Err(ProbeError::Failed("moov atom not found".to_string())));
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::MeasuringDuration);
    assert!(harness.renderer.cues.lock().unwrap().is_empty());
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_render_failure_is_internal() {
    let mut harness = Harness::new();
    harness.renderer = Arc::new(FakeRenderer {
        fail: true,
        ..Default::default()
    });
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Rendering);
    assert_eq!(failure.category, FailureCategory::Internal);
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_publish_errors_are_retried() {
    let harness = Harness::new().publisher(|call| {
        if call < 2 {
            Err(PublishError::transient("storage busy"))
        } else {
            Ok(PublishedVideoId::from_string("vid-final"))
        }
    });
    let orchestrator = harness.build();

    let summary = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap();

    assert_eq!(summary.video_id.as_str(), "vid-final");
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_rejected_publish_is_not_retried() {
    let harness = Harness::new().publisher(|_| Err(PublishError::rejected("title violates policy")));
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Uploading);
    assert_eq!(failure.category, FailureCategory::InvalidInput);
    assert_eq!(failure.attempts, 1);
    assert_eq!(harness.publisher.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_notifier_error_does_not_mask_failure() {
    let mut harness = Harness::new().probe(|_| Ok(-1.0));
    harness.notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..Default::default()
    });
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::MeasuringDuration);
    assert!(matches!(
        failure.source,
        StageError::Probe(ProbeError::InvalidDuration(_))
    ));
    assert_eq!(harness.notifier.seen.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_ends_run() {
    let mut harness = Harness::new().voice(|_| Err(CallError::server_error("busy")));
    harness.voice_keys = 1;
    let orchestrator = Arc::new(harness.build());
    let (tx, rx) = watch::channel(false);

    let run = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(RunRequest::new("t", "p"), rx).await })
    };

    // First voice call fails immediately; the run then sits in a 50ms backoff.
    tokio::time::sleep(Duration::from_millis(10)).await;
    tx.send(true).unwrap();

    let failure = run.await.unwrap().unwrap_err();
    assert_eq!(failure.stage, PipelineStage::SynthesizingAudio);
    assert_eq!(failure.category, FailureCategory::Cancelled);
    assert_eq!(harness.voice.calls.load(Ordering::SeqCst), 1);
    assert!(harness.notifier.seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_run_deadline_fails_current_stage() {
    let mut harness = Harness::new();
    harness.renderer = Arc::new(FakeRenderer {
        delay: Duration::from_secs(3600),
        ..Default::default()
    });
    harness.config.run_timeout = Some(Duration::from_secs(10));
    let orchestrator = harness.build();

    let failure = orchestrator
        .run(RunRequest::new("t", "p"), not_cancelled())
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Rendering);
    assert!(matches!(failure.source, StageError::DeadlineExceeded(10)));
    assert_eq!(failure.category, FailureCategory::Transient);
}

// =============================================================================
// Batch
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_batch_bounds_concurrency() {
    let mut harness = Harness::new();
    harness.renderer = Arc::new(FakeRenderer {
        delay: Duration::from_millis(100),
        ..Default::default()
    });
    let runner = BatchRunner::new(Arc::new(harness.build()), 2);

    let requests = ["a", "b", "c", "d"]
        .iter()
        .map(|t| RunRequest::new(*t, format!("about {}", t)))
        .collect();
    let report = runner.run(requests).await;

    assert!(report.all_succeeded());
    assert_eq!(report.total(), 4);
    assert!(harness.renderer.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(runner.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_shutdown_cancels_queued_runs() {
    let harness = Harness::new();
    let runner = BatchRunner::new(Arc::new(harness.build()), 1);
    runner.shutdown();

    let requests = vec![RunRequest::new("a", "p"), RunRequest::new("b", "p")];
    let report = runner.run(requests).await;

    assert_eq!(report.failed.len(), 2);
    assert!(report
        .failed
        .iter()
        .all(|f| f.category == FailureCategory::Cancelled));
    assert_eq!(harness.text.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_reports_mixed_outcomes() {
    let harness = Harness::new().text(|call| {
        if call == 0 {
            Err(CallError::bad_request("refused"))
        } else {
            Ok(SCRIPT.to_string())
        }
    });
    let runner = BatchRunner::new(Arc::new(harness.build()), 1);

    let report = runner
        .run(vec![RunRequest::new("a", "p"), RunRequest::new("b", "p")])
        .await;

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    assert!(!report.all_succeeded());
}
