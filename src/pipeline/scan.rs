//! Per-file scan
//!
//! A scan runs the error filter, the event parser and the stats reduction
//! over one file. Scans never share state, so files can be read on any
//! number of workers in any order.

use crate::events::{EventParser, LineOutcome, ParsedLine};
use crate::metrics::{parse_stats_line, BestStats};
use crate::source::{ErrorBlockFilter, FilterAction, LogFile};
use serde::Serialize;
use std::path::PathBuf;

/// Options shared by every scan of a run
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub dataset: Option<String>,
    pub capture_errors: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            dataset: None,
            capture_errors: true,
        }
    }
}

/// Receives what a scan finds as it reads
///
/// Nothing is retracted when a file fails part way through: a sink sees the
/// lines read before the failure, and the run drops them afterwards by
/// source ordinal.
pub trait ScanSink {
    fn event(&mut self, line: u64, parsed: ParsedLine);

    fn diagnostic(&mut self, line: u64, text: &str);

    /// Called once when the file has been read
    fn flush(&mut self) {}
}

/// Sink for summary-only scans
#[derive(Debug, Default, Clone, Copy)]
pub struct Discard;

impl ScanSink for Discard {
    fn event(&mut self, _line: u64, _parsed: ParsedLine) {}

    fn diagnostic(&mut self, _line: u64, _text: &str) {}
}

/// Events and diagnostics of one file, with their 1-based line numbers
#[derive(Debug, Clone, Default)]
pub struct ScanBatch {
    pub source: u32,
    pub events: Vec<(u64, ParsedLine)>,
    pub diagnostics: Vec<(u64, String)>,
}

impl ScanBatch {
    pub fn new(source: u32) -> Self {
        Self {
            source,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.diagnostics.is_empty()
    }
}

impl ScanSink for ScanBatch {
    fn event(&mut self, line: u64, parsed: ParsedLine) {
        self.events.push((line, parsed));
    }

    fn diagnostic(&mut self, line: u64, text: &str) {
        self.diagnostics.push((line, text.to_string()));
    }
}

/// A file that could not be read
#[derive(Debug, Clone, Serialize)]
pub struct SourceFailure {
    pub ordinal: u32,
    pub path: PathBuf,
    pub error: String,
}

/// Counters and stats one file contributed to a run
#[derive(Debug, Clone, Default)]
pub struct FileScan {
    pub ordinal: u32,
    pub path: PathBuf,
    pub stats: BestStats,
    pub events: u64,
    pub diagnostics: u64,
    pub lines: u64,
    pub malformed: u64,
    pub failure: Option<SourceFailure>,
}

impl FileScan {
    fn empty(file: &LogFile) -> Self {
        Self {
            ordinal: file.ordinal,
            path: file.path.clone(),
            ..Default::default()
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// Read one file through the filter and parser, handing results to `sink`
///
/// If the file fails part way through, the returned scan keeps only the
/// failure; its counters and stats are dropped.
pub fn scan_file<S: ScanSink>(file: &LogFile, options: &ScanOptions, sink: &mut S) -> FileScan {
    let mut parser = EventParser::new();
    if let Some(dataset) = &options.dataset {
        parser = parser.with_dataset(dataset.clone());
    }
    let mut filter = if options.capture_errors {
        ErrorBlockFilter::new()
    } else {
        ErrorBlockFilter::without_capture()
    };

    let mut scan = FileScan::empty(file);

    let result = file.for_each_line(|line_no, line| match filter.classify(line) {
        FilterAction::Capture => {
            scan.diagnostics += 1;
            sink.diagnostic(line_no, line);
        }
        FilterAction::Suppress => {}
        FilterAction::Forward => match parser.parse(line) {
            LineOutcome::Event(parsed) => {
                scan.events += 1;
                sink.event(line_no, parsed);
            }
            LineOutcome::Malformed(kind) => {
                scan.malformed += 1;
                tracing::trace!("Dropped malformed {} line {} in {:?}", kind, line_no, file.path);
            }
            LineOutcome::Ignored => {
                if let Some(stats) = parse_stats_line(line, options.dataset.as_deref()) {
                    scan.stats.offer(stats);
                }
            }
        },
    });
    sink.flush();

    match result {
        Ok(lines) => {
            scan.lines = lines;
            tracing::debug!(
                "Scanned {:?}: {} lines, {} events, {} captured",
                file.path,
                lines,
                scan.events,
                scan.diagnostics
            );
            scan
        }
        Err(e) => {
            tracing::warn!("Skipping {:?}: {}", file.path, e);
            let mut failed = FileScan::empty(file);
            failed.failure = Some(SourceFailure {
                ordinal: file.ordinal,
                path: file.path.clone(),
                error: e.to_string(),
            });
            failed
        }
    }
}
