//! Run metrics
//!
//! Counters and histograms for a backup run, kept on a private prometheus
//! registry. A batch run has no scrape endpoint, so the exposition text is
//! written to a file once the run finishes (textfile collector style).

use crate::engine::report::JobOutcome;
use crate::error::Result;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::path::Path;
use std::time::Duration;

/// Metrics collected during one orchestration run
#[derive(Clone)]
pub struct RunMetrics {
    registry: Registry,
    outcomes: IntCounterVec,
    duration: Histogram,
    view_polls: IntCounter,
    rollbacks: IntCounter,
}

impl RunMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let outcomes = IntCounterVec::new(
            Opts::new("spoke_backup_outcomes_total", "Spoke backup runs by outcome"),
            &["outcome"],
        )?;
        let duration = Histogram::with_opts(
            HistogramOpts::new(
                "spoke_backup_duration_seconds",
                "Wall-clock duration of a spoke backup run",
            )
            .buckets(vec![10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 900.0, 1800.0]),
        )?;
        let view_polls = IntCounter::new("spoke_backup_view_polls_total", "View reads issued while polling")?;
        let rollbacks = IntCounter::new(
            "spoke_backup_rollbacks_total",
            "Dispatches rolled back after a partial failure",
        )?;

        registry.register(Box::new(outcomes.clone()))?;
        registry.register(Box::new(duration.clone()))?;
        registry.register(Box::new(view_polls.clone()))?;
        registry.register(Box::new(rollbacks.clone()))?;

        Ok(Self {
            registry,
            outcomes,
            duration,
            view_polls,
            rollbacks,
        })
    }

    pub fn record_outcome(&self, outcome: JobOutcome, elapsed: Duration) {
        self.outcomes.with_label_values(&[outcome.as_str()]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn record_view_poll(&self) {
        self.view_polls.inc();
    }

    pub fn record_rollback(&self) {
        self.rollbacks.inc();
    }

    pub fn outcome_count(&self, outcome: JobOutcome) -> u64 {
        self.outcomes.with_label_values(&[outcome.as_str()]).get()
    }

    pub fn view_polls(&self) -> u64 {
        self.view_polls.get()
    }

    pub fn rollbacks(&self) -> u64 {
        self.rollbacks.get()
    }

    /// Prometheus text exposition of every metric
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.encode()?)?;
        Ok(())
    }
}
