//! Orchestrator
//!
//! Fans the spoke job controller out over every requested spoke, one task per
//! spoke, and joins them into a single status report. Tasks are independent:
//! a failure, timeout or panic on one spoke never cancels another spoke or
//! touches its record.

use crate::domain::ports::Spoke;
use crate::engine::job::SpokeJobController;
use crate::engine::report::{JobOutcome, JobPhase, ReportSink, SpokeStatus, StatusReport};
use crate::metrics::RunMetrics;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{error, info, info_span, Instrument};

/// Runs backups on many spokes concurrently
pub struct Orchestrator {
    controller: Arc<SpokeJobController>,
    max_concurrency: Option<usize>,
    metrics: Option<RunMetrics>,
}

impl Orchestrator {
    /// Create an orchestrator; the concurrency cap comes from the controller's config
    pub fn new(controller: SpokeJobController) -> Self {
        let max_concurrency = controller.config().max_concurrency;
        Self {
            controller: Arc::new(controller),
            max_concurrency,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: RunMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Back up every spoke and collect one record per spoke.
    ///
    /// Records appear in completion order.
    pub async fn run_all(&self, spokes: &[Spoke]) -> StatusReport {
        let sink = ReportSink::new();
        let limiter = self.max_concurrency.map(|n| Arc::new(Semaphore::new(n)));

        info!(
            spokes = spokes.len(),
            max_concurrency = ?self.max_concurrency,
            "Launching backups concurrently"
        );

        let started_at = Utc::now();
        let mut handles = Vec::with_capacity(spokes.len());

        for spoke in spokes {
            let controller = self.controller.clone();
            let sink = sink.clone();
            let limiter = limiter.clone();
            let task_spoke = spoke.clone();

            let task = async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let status = controller.run(&task_spoke).await;
                sink.push(status);
            }
            .instrument(info_span!("spoke", name = %spoke));

            handles.push(tokio::spawn(task));
        }

        let results = join_all(handles).await;
        for (spoke, result) in spokes.iter().zip(results) {
            if let Err(e) = result {
                let reason = abort_reason(e);
                error!(spoke = %spoke, error = %reason, "Spoke task aborted");

                let finished_at = Utc::now();
                if let Some(metrics) = &self.metrics {
                    let elapsed = (finished_at - started_at).to_std().unwrap_or(Duration::ZERO);
                    metrics.record_outcome(JobOutcome::Failed, elapsed);
                }
                sink.push(SpokeStatus {
                    spoke: spoke.clone(),
                    outcome: JobOutcome::Failed,
                    error: Some(format!("task aborted: {}", reason)),
                    phase: JobPhase::Failed,
                    started_at,
                    finished_at,
                });
            }
        }

        let report = sink.report();
        info!(
            done = report.count(JobOutcome::Done),
            failed = report.count(JobOutcome::Failed),
            nonexistent = report.count(JobOutcome::NonExistent),
            "Backup run finished"
        );
        report
    }
}

fn abort_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
