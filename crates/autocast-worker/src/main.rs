//! Narrated video worker binary.
//!
//! Runs one pipeline per topic. Topics come from the command line, or from
//! `AUTOCAST_TOPICS` when none are given.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::watch;
use tracing::{error, info, warn};

use autocast_worker::logging::init_tracing;
use autocast_worker::metrics::init_metrics_exporter;
use autocast_worker::{build_orchestrator, BatchRunner, CredentialPools, RunRequest, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider (required for TLS/HTTPS)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    dotenvy::dotenv().ok();
    init_tracing();

    info!("Starting autocast-worker");

    let mut config = WorkerConfig::from_env();
    let cli_topics: Vec<String> = std::env::args()
        .skip(1)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    if !cli_topics.is_empty() {
        config.topics = cli_topics;
    }
    config.validate()?;
    if config.topics.is_empty() {
        bail!("no topics: pass them as arguments or set AUTOCAST_TOPICS");
    }
    info!("Worker config: {:?}", config);

    if let Some(port) = config.metrics_port {
        init_metrics_exporter(port)?;
    }

    let pools = CredentialPools::from_env().context("loading credential pools")?;

    // Kills in-flight encodes; runs are cancelled through the batch runner.
    let (encode_shutdown, encode_shutdown_rx) = watch::channel(false);
    let orchestrator = build_orchestrator(&config, &pools, encode_shutdown_rx)?;
    let runner = BatchRunner::new(Arc::new(orchestrator), config.max_concurrent_runs);

    let requests: Vec<RunRequest> = config
        .topics
        .iter()
        .map(|topic| RunRequest::new(topic.clone(), config.prompt_for(topic)))
        .collect();

    let batch = runner.run(requests);
    tokio::pin!(batch);

    let report = tokio::select! {
        report = &mut batch => report,
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, cancelling runs");
            runner.shutdown();
            encode_shutdown.send_replace(true);
            match tokio::time::timeout(config.shutdown_timeout, &mut batch).await {
                Ok(report) => report,
                Err(_) => {
                    warn!(
                        timeout_secs = config.shutdown_timeout.as_secs(),
                        "Runs did not stop in time"
                    );
                    bail!("shutdown timed out");
                }
            }
        }
    };

    for summary in &report.succeeded {
        info!(
            run_id = %summary.run_id,
            topic = %summary.topic,
            video_id = %summary.video_id,
            "Run done"
        );
    }
    for failure in &report.failed {
        error!(
            run_id = %failure.run_id,
            stage = %failure.stage,
            category = %failure.category,
            attempts = failure.attempts,
            "Run failed: {}",
            failure.source
        );
    }
    for pool in [&pools.text, &pools.voice] {
        for snapshot in pool.snapshot() {
            info!(
                pool = %pool.name(),
                credential = %snapshot.id,
                fingerprint = %snapshot.fingerprint,
                success = snapshot.total_success,
                failure = snapshot.total_failure,
                retired = snapshot.retired,
                "Credential usage"
            );
        }
    }

    if !report.all_succeeded() {
        bail!(
            "{} of {} runs failed",
            report.failed.len() + report.panicked,
            report.total()
        );
    }
    info!("Worker finished");
    Ok(())
}
