//! Run reports

use crate::emit::ArtifactOutcome;
use crate::events::EventKind;
use crate::metrics::StatsLine;
use crate::pipeline::scan::SourceFailure;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events seen per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EventCounts {
    pub flush: u64,
    pub merge: u64,
    pub components: u64,
}

impl EventCounts {
    pub fn record(&mut self, kind: EventKind) {
        match kind {
            EventKind::Flush => self.flush += 1,
            EventKind::Merge => self.merge += 1,
            EventKind::Components => self.components += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.flush + self.merge + self.components
    }
}

/// Outcome of a full reconstruction run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub task_name: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub files_scanned: usize,
    pub failures: Vec<SourceFailure>,
    pub lines_read: u64,
    pub lines_captured: u64,
    /// Includes `out_of_range_events`
    pub malformed_lines: u64,
    /// Events dropped for a generation far past the end of the table
    pub out_of_range_events: u64,
    pub events: EventCounts,
    /// Rows in the metrics table
    pub generations: usize,
    /// Merges reported for a generation whose flush was never seen
    pub unallocated_merges: u64,
    pub spilled_runs: usize,
    pub summary: Option<StatsLine>,
    pub artifacts: Vec<ArtifactOutcome>,
}

impl RunReport {
    /// Whether every artifact was written
    pub fn artifacts_ok(&self) -> bool {
        self.artifacts.iter().all(|a| a.is_ok())
    }

    pub fn failed_artifacts(&self) -> impl Iterator<Item = &ArtifactOutcome> {
        self.artifacts.iter().filter(|a| !a.is_ok())
    }
}

/// Outcome of a summary-only run
#[derive(Debug, Clone, Serialize)]
pub struct SummaryReport {
    pub files_scanned: usize,
    pub failures: Vec<SourceFailure>,
    pub lines_read: u64,
    pub summary: Option<StatsLine>,
}
