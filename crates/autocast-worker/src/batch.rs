//! Concurrent batch of pipeline runs.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::pipeline::{PipelineOrchestrator, RunRequest};
use crate::report::{PipelineFailure, RunSummary};
use crate::retry::cancelled;

/// Outcome of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<RunSummary>,
    pub failed: Vec<PipelineFailure>,
    /// Runs whose task panicked.
    pub panicked: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len() + self.panicked
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty() && self.panicked == 0
    }
}

/// Runs one orchestrator run per request, a bounded number at a time.
///
/// Runs share only the orchestrator (and through it the credential pools).
pub struct BatchRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    run_semaphore: Arc<Semaphore>,
    max_concurrent_runs: usize,
    shutdown: watch::Sender<bool>,
}

impl BatchRunner {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, max_concurrent_runs: usize) -> Self {
        let max_concurrent_runs = max_concurrent_runs.max(1);
        let (shutdown, _) = watch::channel(false);
        Self {
            orchestrator,
            run_semaphore: Arc::new(Semaphore::new(max_concurrent_runs)),
            max_concurrent_runs,
            shutdown,
        }
    }

    /// Run every request and wait for all of them.
    ///
    /// Requests still waiting for a slot when shutdown is signalled end as
    /// cancelled runs without calling any collaborator.
    pub async fn run(&self, requests: Vec<RunRequest>) -> BatchReport {
        info!(
            runs = requests.len(),
            max_concurrent = self.max_concurrent_runs,
            "Starting batch"
        );

        let mut tasks = JoinSet::new();
        for request in requests {
            let orchestrator = Arc::clone(&self.orchestrator);
            let semaphore = Arc::clone(&self.run_semaphore);
            let mut cancel_rx = self.shutdown.subscribe();

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    _ = cancelled(&mut cancel_rx) => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                orchestrator.run(request, cancel_rx).await
            });
        }

        let mut report = BatchReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(summary)) => report.succeeded.push(summary),
                Ok(Err(failure)) => report.failed.push(failure),
                Err(e) => {
                    error!("Run task panicked: {}", e);
                    report.panicked += 1;
                }
            }
        }

        if report.all_succeeded() {
            info!(succeeded = report.succeeded.len(), "Batch finished");
        } else {
            warn!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                panicked = report.panicked,
                "Batch finished with failures"
            );
        }
        report
    }

    /// Cancel every in-flight and queued run.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Runs currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.max_concurrent_runs - self.run_semaphore.available_permits()
    }
}
