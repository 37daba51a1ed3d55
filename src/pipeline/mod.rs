//! Reconstruction pipeline
//!
//! - **scan**: Per-file filter/parse/stats pass
//! - **ingest**: Streaming hand-off from scans to the sorters
//! - **report**: Run and summary reports
//!
//! # Architecture
//!
//! ```text
//!                ┌─ spawn_blocking ─ scan_file(0) ─┐
//! LogSource ─────┼─ spawn_blocking ─ scan_file(1) ─┼──► mpsc ──► Ingest
//!  (semaphore)   └─ spawn_blocking ─ scan_file(n) ─┘   (bounded)   │
//!                                                                  ▼ barrier
//!          Sequencer ──► MetricsReconstructor ──► Emitter ──► RunReport
//! ```
//!
//! Scans run in parallel, bounded by `max_parallel_files`, and stream their
//! lines into the sorters as they read. Reconstruction starts once every
//! scan is back. Lines from a file that failed part way through are dropped
//! on the way out by source ordinal, so nothing about completion order or
//! partial reads shows in the output.

pub mod ingest;
pub mod report;
pub mod scan;

pub use ingest::{ChannelSink, Ingest, BATCH_LINES};
pub use report::{EventCounts, RunReport, SummaryReport};
pub use scan::{scan_file, Discard, FileScan, ScanBatch, ScanOptions, ScanSink, SourceFailure};

use crate::config::Config;
use crate::emit::{
    write_catalog_entry, write_event, write_live_component, ArtifactKind, ArtifactOutcome,
    Emitter,
};
use crate::events::Event;
use crate::metrics::{BestStats, MetricsReconstructor};
use crate::sequencer::{CatalogRow, ExternalSorter, LiveComponentRow, SequencerError};
use crate::source::{LogSource, Quiescence, SourceError};
use chrono::Utc;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

/// Fatal pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Sequencer error: {0}")]
    Sequencer(#[from] SequencerError),

    #[error("Worker failed: {0}")]
    Worker(String),
}

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Settings for one run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub log_dir: PathBuf,
    pub pattern: String,
    pub dataset: Option<String>,
    pub capture_errors: bool,
    pub max_parallel_files: usize,
    pub spill_threshold: usize,
    pub spill_dir: Option<PathBuf>,
    pub max_generation_gap: u64,
    pub output_dir: PathBuf,
    pub task_name: String,
    pub quiescence: Quiescence,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            log_dir: config.source.log_dir.clone(),
            pattern: config.source.pattern.clone(),
            dataset: config.source.dataset.clone(),
            capture_errors: config.source.capture_errors,
            max_parallel_files: config.source.max_parallel_files,
            spill_threshold: config.sequencer.spill_threshold,
            spill_dir: config.sequencer.spill_dir.clone(),
            max_generation_gap: config.metrics.max_generation_gap,
            output_dir: config.output.dir.clone(),
            task_name: config.output.task_name.clone(),
            quiescence: Quiescence::new(
                config.quiescence.flush_flag.clone(),
                config.quiescence.merge_flag.clone(),
            ),
        }
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            dataset: self.dataset.clone(),
            capture_errors: self.capture_errors,
        }
    }

    /// Empty sorters for one run
    pub fn ingest(&self) -> Ingest {
        Ingest::new(self.spill_threshold, self.spill_dir.clone())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// One reconstruction run over a log directory
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Scan every selected file, one blocking worker per file
    ///
    /// `make_sink` builds the sink each worker reports to. Returns the scans
    /// sorted by ordinal.
    pub async fn scan_with<S, F>(&self, make_sink: F) -> PipelineResult<Vec<FileScan>>
    where
        S: ScanSink + Send + 'static,
        F: Fn(u32) -> S,
    {
        if self.config.quiescence.is_configured() {
            self.config.quiescence.verify()?;
        }

        let source = LogSource::open(&self.config.log_dir, &self.config.pattern)?;
        let options = Arc::new(self.config.scan_options());
        let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_files.max(1)));

        let mut workers = JoinSet::new();
        for file in source.into_files() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::Worker(e.to_string()))?;
            let options = options.clone();
            let mut sink = make_sink(file.ordinal);

            workers.spawn_blocking(move || {
                let _permit = permit;
                scan_file(&file, &options, &mut sink)
            });
        }

        let mut scans = Vec::new();
        while let Some(joined) = workers.join_next().await {
            scans.push(joined.map_err(|e| PipelineError::Worker(e.to_string()))?);
        }

        scans.sort_by_key(|scan| scan.ordinal);
        Ok(scans)
    }

    /// Full run: scan, sequence, fold and write every artifact
    pub async fn run(&self) -> PipelineResult<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();

        tracing::info!(
            "Starting reconstruction of {:?} ({}) as task '{}'",
            self.config.log_dir,
            self.config.pattern,
            self.config.task_name
        );

        let (tx, rx) = mpsc::channel(self.config.max_parallel_files.max(1) * 2);
        let ingest = self.config.ingest();
        let consumer = tokio::task::spawn_blocking(move || ingest.consume(rx));

        let scans = self
            .scan_with(|ordinal| ChannelSink::new(ordinal, tx.clone()))
            .await;
        drop(tx);
        let scans = scans?;

        let ingest = consumer
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;

        let config = self.config.clone();
        let mut report = tokio::task::spawn_blocking(move || reconstruct(&config, scans, ingest))
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))??;

        report.started_at = started_at;
        report.elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Reconstructed {} generations from {} events in {} files ({} ms)",
            report.generations,
            report.events.total(),
            report.files_scanned,
            report.elapsed_ms
        );
        Ok(report)
    }

    /// Summary-only run: the best end-of-run stats line across all files
    pub async fn summarize(&self) -> PipelineResult<SummaryReport> {
        let scans = self.scan_with(|_| Discard).await?;

        let mut best = BestStats::new();
        let mut failures = Vec::new();
        let mut lines_read = 0;
        let files_scanned = scans.len();

        for scan in scans {
            lines_read += scan.lines;
            failures.extend(scan.failure);
            best.merge(scan.stats);
        }

        Ok(SummaryReport {
            files_scanned,
            failures,
            lines_read,
            summary: best.into_best(),
        })
    }
}

/// Sequence, fold and emit what a set of file scans produced
///
/// Blocking. Scans may be given in any order. Anything `ingest` holds from a
/// failed scan is left out.
pub fn reconstruct(
    config: &PipelineConfig,
    mut scans: Vec<FileScan>,
    ingest: Ingest,
) -> PipelineResult<RunReport> {
    scans.sort_by_key(|scan| scan.ordinal);
    let failed: HashSet<u32> = scans
        .iter()
        .filter(|scan| scan.is_failed())
        .map(|scan| scan.ordinal)
        .collect();

    let emitter = Emitter::new(&config.output_dir, &config.task_name);
    emitter.prepare();

    let mut report = RunReport {
        task_name: config.task_name.clone(),
        started_at: Utc::now(),
        elapsed_ms: 0,
        files_scanned: scans.len(),
        failures: Vec::new(),
        lines_read: 0,
        lines_captured: 0,
        malformed_lines: 0,
        out_of_range_events: 0,
        events: Default::default(),
        generations: 0,
        unallocated_merges: 0,
        spilled_runs: ingest.spilled_runs(),
        summary: None,
        artifacts: Vec::new(),
    };

    let mut best = BestStats::new();
    for scan in scans {
        report.lines_read += scan.lines;
        report.lines_captured += scan.diagnostics;
        report.malformed_lines += scan.malformed;
        report.failures.extend(scan.failure);
        best.merge(scan.stats);
    }

    let (sequencer, diagnostics) = ingest.into_parts();

    let mut fold = MetricsReconstructor::new().with_max_generation_gap(config.max_generation_gap);
    let mut live = ExternalSorter::new(config.spill_threshold, config.spill_dir.clone());
    let mut catalog = ExternalSorter::new(config.spill_threshold, config.spill_dir.clone());
    let mut created = 0u64;

    let mut events_out = emitter.open(ArtifactKind::Events);
    for sequenced in sequencer.finish()? {
        let sequenced = sequenced?;
        if failed.contains(&sequenced.key.source) || !fold.apply_event(&sequenced.event) {
            continue;
        }

        report.events.record(sequenced.key.kind);
        write_event(&mut events_out, &sequenced);

        if let Event::Components(snapshot) = &sequenced.event {
            for component in &snapshot.live_components {
                live.push(LiveComponentRow::new(snapshot.generation, component))?;
            }
        }
        for component in sequenced.event.created_components() {
            catalog.push(CatalogRow {
                level: component.level,
                index: component.index,
                seq: created,
                size_bytes: component.size_bytes,
            })?;
            created += 1;
        }
    }
    report.artifacts.push(events_out.finish());

    report.unallocated_merges = fold.unallocated_merges();
    report.out_of_range_events = fold.out_of_range_events();
    report.malformed_lines += report.out_of_range_events;
    let table = fold.finish();
    report.generations = table.len();
    report.artifacts.push(emitter.write_generations(&table));

    let mut diagnostics_out = emitter.open(ArtifactKind::Diagnostics);
    for row in diagnostics.finish()? {
        let row = row?;
        if !failed.contains(&row.source) {
            diagnostics_out.write_line(&row.text);
        }
    }
    report.artifacts.push(diagnostics_out.finish());

    report.spilled_runs += live.spilled_runs() + catalog.spilled_runs();

    let mut live_out = emitter.open(ArtifactKind::Components);
    for row in live.finish()? {
        write_live_component(&mut live_out, &row?);
    }
    report.artifacts.push(live_out.finish());

    let mut catalog_out = emitter.open(ArtifactKind::Catalog);
    for row in catalog.finish()? {
        write_catalog_entry(&mut catalog_out, &row?);
    }
    report.artifacts.push(catalog_out.finish());

    report.summary = best.into_best();
    report.artifacts.push(emitter.write_summary(report.summary.as_ref()));

    log_outcomes(&report.artifacts);
    Ok(report)
}

fn log_outcomes(outcomes: &[ArtifactOutcome]) {
    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        tracing::warn!("{} of {} artifacts could not be written", failed, outcomes.len());
    }
}
