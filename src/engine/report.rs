//! Status Report
//!
//! One record per spoke, appended by concurrent spoke tasks through a shared
//! sink. Records keep completion order.

use crate::domain::ports::Spoke;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Placeholder shown in the error column of a successful record
pub const NO_ERROR: &str = "NoError";

// =============================================================================
// Outcome and Phase
// =============================================================================

/// Final result of one spoke run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobOutcome {
    Done,
    Failed,
    NonExistent,
}

impl JobOutcome {
    /// Lowercase label used for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Done => "done",
            JobOutcome::Failed => "failed",
            JobOutcome::NonExistent => "nonexistent",
        }
    }
}

impl std::fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobOutcome::Done => write!(f, "Done"),
            JobOutcome::Failed => write!(f, "Failed"),
            JobOutcome::NonExistent => write!(f, "NonExistent"),
        }
    }
}

/// Life-cycle phase of a spoke run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobPhase {
    Created,
    Dispatching,
    AwaitingLaunch,
    AwaitingCompletion,
    CleaningUp,
    Done,
    Failed,
    NonExistent,
}

impl JobPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobPhase::Done | JobPhase::Failed | JobPhase::NonExistent)
    }
}

impl std::fmt::Display for JobPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Spoke Status
// =============================================================================

/// Status record for one spoke
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpokeStatus {
    pub spoke: Spoke,
    pub outcome: JobOutcome,
    pub error: Option<String>,
    /// `Done` or `NonExistent` for those outcomes. For failures, the phase
    /// that failed, or `Failed` when the task aborted before reporting.
    pub phase: JobPhase,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SpokeStatus {
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or(NO_ERROR)
    }

    pub fn elapsed(&self) -> std::time::Duration {
        (self.finished_at - self.started_at).to_std().unwrap_or_default()
    }
}

// =============================================================================
// Report Sink
// =============================================================================

/// Shared, append-only collection of status records
#[derive(Debug, Clone, Default)]
pub struct ReportSink {
    entries: Arc<Mutex<Vec<SpokeStatus>>>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, status: SpokeStatus) {
        self.entries.lock().push(status);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot the records collected so far
    pub fn report(&self) -> StatusReport {
        StatusReport {
            entries: self.entries.lock().clone(),
        }
    }
}

// =============================================================================
// Status Report
// =============================================================================

/// Aggregate report of one orchestration run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub entries: Vec<SpokeStatus>,
}

impl StatusReport {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, spoke: &str) -> Option<&SpokeStatus> {
        self.entries.iter().find(|e| e.spoke.name() == spoke)
    }

    pub fn count(&self, outcome: JobOutcome) -> usize {
        self.entries.iter().filter(|e| e.outcome == outcome).count()
    }

    pub fn all_done(&self) -> bool {
        self.entries.iter().all(|e| e.outcome == JobOutcome::Done)
    }

    /// Fixed-width table with one row per spoke
    pub fn render_table(&self) -> String {
        const HEADERS: [&str; 3] = ["Cluster Name", "Cluster Status", "Error"];

        let rows: Vec<[String; 3]> = self
            .entries
            .iter()
            .map(|e| {
                [
                    e.spoke.to_string(),
                    e.outcome.to_string(),
                    e.error_text().to_string(),
                ]
            })
            .collect();

        let mut widths = HEADERS.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row.iter()) {
                *width = (*width).max(cell.len());
            }
        }

        let line = |cells: [&str; 3]| {
            format!(
                "{:<w0$} | {:<w1$} | {:<w2$} |\n",
                cells[0],
                cells[1],
                cells[2],
                w0 = widths[0],
                w1 = widths[1],
                w2 = widths[2],
            )
        };

        let total = widths.iter().sum::<usize>() + 8;
        let mut out = "-".repeat(total);
        out.push('\n');
        out.push_str(&line(HEADERS));
        for row in &rows {
            out.push_str(&line([&row[0], &row[1], &row[2]]));
        }
        out
    }
}
