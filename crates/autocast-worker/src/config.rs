//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use autocast_media::AllocationPolicy;

use crate::error::{WorkerError, WorkerResult};

/// Default prompt; `{topic}` is replaced with the run topic.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "Write a 45-second narration script for a short vertical video about: {topic}. \
Use short, complete sentences. Return only the narration text.";

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum pipeline runs executing at once
    pub max_concurrent_runs: usize,
    /// Deadline for a whole run
    pub run_timeout: Duration,
    /// Grace period for in-flight runs after a shutdown signal
    pub shutdown_timeout: Duration,
    /// Parent of the probe and render scratch files
    pub work_dir: String,
    /// Where the directory publisher writes videos
    pub output_dir: String,
    /// Topics processed by one batch (one run each)
    pub topics: Vec<String>,
    pub prompt_template: String,
    /// Target seconds per subtitle cue
    pub seconds_per_cue: f64,
    /// Minimum subtitle cue length in seconds
    pub min_cue_secs: f64,
    pub allocation: AllocationPolicy,
    /// Tags attached to every published video
    pub default_tags: Vec<String>,
    /// Slack-compatible webhook for failure notifications
    pub slack_webhook_url: Option<String>,
    /// Prometheus listener port
    pub metrics_port: Option<u16>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 2,
            run_timeout: Duration::from_secs(1800),
            shutdown_timeout: Duration::from_secs(30),
            work_dir: "/tmp/autocast".to_string(),
            output_dir: "/tmp/autocast/published".to_string(),
            topics: Vec::new(),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            seconds_per_cue: 4.0,
            min_cue_secs: 0.3,
            allocation: AllocationPolicy::ChunkCount,
            default_tags: vec!["AI".to_string(), "Shorts".to_string()],
            slack_webhook_url: None,
            metrics_port: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let work_dir = std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir);
        let output_dir = std::env::var("PUBLISH_OUTPUT_DIR").unwrap_or_else(|_| {
            PathBuf::from(&work_dir)
                .join("published")
                .to_string_lossy()
                .to_string()
        });

        Self {
            max_concurrent_runs: std::env::var("WORKER_MAX_CONCURRENT_RUNS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_concurrent_runs),
            run_timeout: Duration::from_secs(
                std::env::var("WORKER_RUN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1800),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            work_dir,
            output_dir,
            topics: std::env::var("AUTOCAST_TOPICS")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
            prompt_template: std::env::var("PROMPT_TEMPLATE").unwrap_or(defaults.prompt_template),
            seconds_per_cue: std::env::var("SUBTITLE_SECONDS_PER_CUE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.seconds_per_cue),
            min_cue_secs: std::env::var("SUBTITLE_MIN_CUE_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_cue_secs),
            allocation: std::env::var("SUBTITLE_ALLOCATION")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.allocation),
            default_tags: std::env::var("PUBLISH_TAGS")
                .map(|s| split_list(&s))
                .unwrap_or(defaults.default_tags),
            slack_webhook_url: std::env::var("SLACK_WEBHOOK_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.max_concurrent_runs == 0 {
            return Err(WorkerError::config_error(
                "WORKER_MAX_CONCURRENT_RUNS must be at least 1",
            ));
        }
        if !(self.seconds_per_cue.is_finite() && self.seconds_per_cue > 0.0) {
            return Err(WorkerError::config_error(
                "SUBTITLE_SECONDS_PER_CUE must be a positive number",
            ));
        }
        if !(self.min_cue_secs.is_finite() && self.min_cue_secs > 0.0) {
            return Err(WorkerError::config_error(
                "SUBTITLE_MIN_CUE_SECS must be a positive number",
            ));
        }
        if !self.prompt_template.contains("{topic}") {
            return Err(WorkerError::config_error(
                "PROMPT_TEMPLATE must contain a {topic} placeholder",
            ));
        }
        Ok(())
    }

    /// Prompt for one topic.
    pub fn prompt_for(&self, topic: &str) -> String {
        self.prompt_template.replace("{topic}", topic.trim())
    }
}

/// Split a comma- or newline-separated list, dropping empties.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split([',', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
