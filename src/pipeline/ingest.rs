//! Streaming hand-off from scan workers to the sorters
//!
//! Workers send `ScanBatch`es over a bounded channel while they read. One
//! blocking consumer pushes them into the sequencer and the diagnostics
//! sorter. In-flight lines are capped by the channel bound times
//! `BATCH_LINES`, and the sorters spill at their threshold, so memory stays
//! flat however large the logs are.

use crate::events::ParsedLine;
use crate::pipeline::scan::{ScanBatch, ScanSink};
use crate::sequencer::{DiagnosticRow, ExternalSorter, Sequencer, SequencerResult};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Lines a worker buffers before handing a batch over
pub const BATCH_LINES: usize = 1024;

/// Sink that forwards a file's lines in batches over a channel
///
/// Must be driven from a blocking thread. Once the receiver is gone the sink
/// drops everything it is given.
pub struct ChannelSink {
    tx: mpsc::Sender<ScanBatch>,
    batch: ScanBatch,
    closed: bool,
}

impl ChannelSink {
    pub fn new(source: u32, tx: mpsc::Sender<ScanBatch>) -> Self {
        Self {
            tx,
            batch: ScanBatch::new(source),
            closed: false,
        }
    }

    fn send(&mut self) {
        if self.closed || self.batch.is_empty() {
            return;
        }
        let source = self.batch.source;
        let batch = std::mem::replace(&mut self.batch, ScanBatch::new(source));
        if self.tx.blocking_send(batch).is_err() {
            tracing::debug!("Ingest closed, dropping the rest of source {}", source);
            self.closed = true;
        }
    }

    fn send_if_full(&mut self) {
        if self.batch.len() >= BATCH_LINES {
            self.send();
        }
    }
}

impl ScanSink for ChannelSink {
    fn event(&mut self, line: u64, parsed: ParsedLine) {
        if !self.closed {
            self.batch.event(line, parsed);
            self.send_if_full();
        }
    }

    fn diagnostic(&mut self, line: u64, text: &str) {
        if !self.closed {
            self.batch.diagnostic(line, text);
            self.send_if_full();
        }
    }

    fn flush(&mut self) {
        self.send();
    }
}

/// Sorted collection of everything the scans found
///
/// Batches may arrive in any order: events sort by `SequenceKey` and
/// diagnostics by (source, line).
pub struct Ingest {
    sequencer: Sequencer,
    diagnostics: ExternalSorter<DiagnosticRow>,
}

impl Ingest {
    pub fn new(spill_threshold: usize, spill_dir: Option<PathBuf>) -> Self {
        Self {
            sequencer: Sequencer::new(spill_threshold, spill_dir.clone()),
            diagnostics: ExternalSorter::new(spill_threshold, spill_dir),
        }
    }

    pub fn push_batch(&mut self, batch: ScanBatch) -> SequencerResult<()> {
        for (line, parsed) in batch.events {
            self.sequencer.push(batch.source, line, parsed)?;
        }
        for (line, text) in batch.diagnostics {
            self.diagnostics.push(DiagnosticRow {
                source: batch.source,
                line,
                text,
            })?;
        }
        Ok(())
    }

    /// Drain `rx` until every sender has been dropped
    ///
    /// Blocking. On error the receiver is dropped, which stops the senders.
    pub fn consume(mut self, mut rx: mpsc::Receiver<ScanBatch>) -> SequencerResult<Self> {
        while let Some(batch) = rx.blocking_recv() {
            self.push_batch(batch)?;
        }
        Ok(self)
    }

    pub fn events(&self) -> u64 {
        self.sequencer.len()
    }

    pub fn spilled_runs(&self) -> usize {
        self.sequencer.spilled_runs() + self.diagnostics.spilled_runs()
    }

    pub fn into_parts(self) -> (Sequencer, ExternalSorter<DiagnosticRow>) {
        (self.sequencer, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::scan::{scan_file, ScanOptions};
    use crate::source::LogFile;
    use tempfile::tempdir;

    fn flush_lines(count: usize) -> String {
        (1..=count)
            .map(|g| format!("[FLUSH]\t{g}\ta\tb\t{g}\t0\tc\t0_{g}:10\n"))
            .collect()
    }

    #[test]
    fn test_worker_streams_batches_while_reading() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nc.log");
        std::fs::write(&path, flush_lines(BATCH_LINES * 2 + 5)).unwrap();

        let (tx, mut rx) = mpsc::channel(1);
        let worker = std::thread::spawn(move || {
            let mut sink = ChannelSink::new(3, tx);
            scan_file(&LogFile::new(3, &path), &ScanOptions::default(), &mut sink)
        });

        let mut sizes = Vec::new();
        while let Some(batch) = rx.blocking_recv() {
            assert_eq!(batch.source, 3);
            sizes.push(batch.len());
        }
        let scan = worker.join().unwrap();

        assert_eq!(sizes, vec![BATCH_LINES, BATCH_LINES, 5]);
        assert_eq!(scan.events, (BATCH_LINES * 2 + 5) as u64);
    }

    #[test]
    fn test_sink_stops_after_receiver_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nc.log");
        std::fs::write(&path, flush_lines(BATCH_LINES + 1)).unwrap();

        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        let mut sink = ChannelSink::new(0, tx);
        let scan = scan_file(&LogFile::new(0, &path), &ScanOptions::default(), &mut sink);

        assert!(sink.closed);
        assert!(sink.batch.is_empty());
        assert_eq!(scan.events, (BATCH_LINES + 1) as u64);
    }

    #[test]
    fn test_consume_spills_at_threshold() {
        let (tx, rx) = mpsc::channel(4);
        let mut batch = ScanBatch::new(0);
        for line in 1..=20u64 {
            batch.diagnostic(line, &format!("\tat frame {line}"));
        }
        tx.blocking_send(batch).unwrap();
        drop(tx);

        let ingest = Ingest::new(5, None).consume(rx).unwrap();
        assert_eq!(ingest.spilled_runs(), 4);

        let (_, diagnostics) = ingest.into_parts();
        let lines: Vec<u64> = diagnostics.finish().unwrap().map(|r| r.unwrap().line).collect();
        assert_eq!(lines, (1..=20).collect::<Vec<_>>());
    }
}
