//! Pipeline metrics.

use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use autocast_models::{PipelineStage, RunStatus};

use crate::error::{WorkerError, WorkerResult};

/// Install the Prometheus recorder with a scrape listener on `port`.
///
/// Must be called from inside the Tokio runtime.
pub fn init_metrics_exporter(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))?;
    info!(port, "Prometheus metrics listener started");
    Ok(())
}

pub mod names {
    /// Finished runs by status (`done` / `failed`).
    pub const RUNS_TOTAL: &str = "autocast_pipeline_runs_total";

    /// Failed runs by the stage that failed.
    pub const STAGE_FAILURES_TOTAL: &str = "autocast_pipeline_stage_failures_total";

    /// Stage wall time in seconds.
    pub const STAGE_DURATION_SECONDS: &str = "autocast_pipeline_stage_duration_seconds";

    /// Whole-run wall time in seconds.
    pub const RUN_DURATION_SECONDS: &str = "autocast_pipeline_run_duration_seconds";

    /// Failure notifications that could not be delivered.
    pub const NOTIFY_FAILURES_TOTAL: &str = "autocast_notify_failures_total";
}

pub fn record_run(status: RunStatus, elapsed: Duration) {
    counter!(names::RUNS_TOTAL, "status" => status.as_str()).increment(1);
    histogram!(names::RUN_DURATION_SECONDS, "status" => status.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_stage(stage: PipelineStage, elapsed: Duration) {
    histogram!(names::STAGE_DURATION_SECONDS, "stage" => stage.as_str())
        .record(elapsed.as_secs_f64());
}

pub fn record_stage_failure(stage: PipelineStage) {
    counter!(names::STAGE_FAILURES_TOTAL, "stage" => stage.as_str()).increment(1);
}

pub fn record_notify_failure() {
    counter!(names::NOTIFY_FAILURES_TOTAL).increment(1);
}
