//! Event sequencing
//!
//! - **sorter**: Stable external sort with spill-to-disk runs
//! - **run**: Run file format (LZ4 frames with CRC32)
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! scan batches ─────► Sequencer ──► ExternalSorter<SequencedEvent>
//!                                      │ spill_threshold reached
//!                                      ▼
//!                                   run-000000.dat, run-000001.dat, ...
//!                                      │ finish()
//!                                      ▼
//!                                   k-way merge ──► ordered events
//! ```
//!
//! The sequencer is a barrier: nothing comes out until every file scan has
//! been pushed. Push order does not matter, since every key is unique.

pub mod error;
pub mod run;
pub mod sorter;

pub use error::{SequencerError, SequencerResult};
pub use sorter::{ExternalSorter, SortedIter};

use crate::events::{ComponentDescriptor, Event, EventKind, ParsedLine};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::PathBuf;

/// Total order imposed on events
///
/// Field order is the comparison order: generation first, then kind rank,
/// then file-scan position and line number as the stable secondary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub generation: u64,
    pub kind: EventKind,
    /// Ordinal of the source file
    pub source: u32,
    /// 1-based line number within the source file
    pub line: u64,
}

/// An event tagged with its sequence key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequencedEvent {
    pub key: SequenceKey,
    pub event: Event,
    /// Raw fields, for the ordered event log
    pub fields: Vec<String>,
}

impl SequencedEvent {
    pub fn new(source: u32, line: u64, parsed: ParsedLine) -> Self {
        let key = SequenceKey {
            generation: parsed.event.generation(),
            kind: parsed.event.kind(),
            source,
            line,
        };
        Self {
            key,
            event: parsed.event,
            fields: parsed.fields,
        }
    }
}

impl PartialEq for SequencedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for SequencedEvent {}

impl PartialOrd for SequencedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SequencedEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

/// Row of the live-component artifact, ordered by (generation, level, index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LiveComponentRow {
    pub generation: u64,
    pub level: u32,
    pub index: u64,
    pub size_bytes: u64,
}

impl LiveComponentRow {
    pub fn new(generation: u64, component: &ComponentDescriptor) -> Self {
        Self {
            generation,
            level: component.level,
            index: component.index,
            size_bytes: component.size_bytes,
        }
    }

    pub fn component(&self) -> ComponentDescriptor {
        ComponentDescriptor::new(self.level, self.index, self.size_bytes)
    }
}

/// Row of the component catalog, ordered by (level, index) then creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CatalogRow {
    pub level: u32,
    pub index: u64,
    pub seq: u64,
    pub size_bytes: u64,
}

impl CatalogRow {
    pub fn component(&self) -> ComponentDescriptor {
        ComponentDescriptor::new(self.level, self.index, self.size_bytes)
    }
}

/// Captured error-block line, ordered by (source, line)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiagnosticRow {
    pub source: u32,
    pub line: u64,
    pub text: String,
}

/// Orders parsed events across all files by `SequenceKey`
pub struct Sequencer {
    sorter: ExternalSorter<SequencedEvent>,
}

impl Sequencer {
    pub fn new(spill_threshold: usize, spill_dir: Option<PathBuf>) -> Self {
        Self {
            sorter: ExternalSorter::new(spill_threshold, spill_dir),
        }
    }

    /// Add one parsed line from file `source` at `line`
    pub fn push(&mut self, source: u32, line: u64, parsed: ParsedLine) -> SequencerResult<()> {
        self.sorter.push(SequencedEvent::new(source, line, parsed))
    }

    pub fn len(&self) -> u64 {
        self.sorter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorter.is_empty()
    }

    pub fn spilled_runs(&self) -> usize {
        self.sorter.spilled_runs()
    }

    /// Close the barrier and return every event in sequence order
    pub fn finish(self) -> SequencerResult<SortedIter<SequencedEvent>> {
        tracing::debug!(
            "Sequencing {} events ({} spilled runs)",
            self.sorter.len(),
            self.sorter.spilled_runs()
        );
        self.sorter.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventParser, LineOutcome};

    fn parsed(line: &str) -> ParsedLine {
        match EventParser::new().parse(line) {
            LineOutcome::Event(p) => p,
            other => panic!("expected event, got {:?}", other),
        }
    }

    fn flush(g: u64) -> ParsedLine {
        parsed(&format!("[FLUSH]\t{g}\ta\tb\t{g}\t0\tc\t0_{g}:10"))
    }

    fn merge(g: u64, size: u64) -> ParsedLine {
        parsed(&format!("[MERGE]\t{g}\ta\tb\tc\td\te\t0\t1_{g}:{size}"))
    }

    fn components(g: u64) -> ParsedLine {
        parsed(&format!("[COMPONENTS]\t{g}\t0_1:10"))
    }

    fn order(sequencer: Sequencer) -> Vec<(u64, EventKind, u32, u64)> {
        sequencer
            .finish()
            .unwrap()
            .map(|e| e.map(|e| (e.key.generation, e.key.kind, e.key.source, e.key.line)))
            .collect::<SequencerResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_generation_then_kind_then_position() {
        let mut sequencer = Sequencer::new(1000, None);
        sequencer.push(1, 5, merge(2, 30)).unwrap();
        sequencer.push(0, 9, components(2)).unwrap();
        sequencer.push(0, 3, merge(2, 20)).unwrap();
        sequencer.push(1, 1, flush(2)).unwrap();
        sequencer.push(0, 1, flush(1)).unwrap();

        assert_eq!(
            order(sequencer),
            vec![
                (1, EventKind::Flush, 0, 1),
                (2, EventKind::Flush, 1, 1),
                (2, EventKind::Merge, 0, 3),
                (2, EventKind::Merge, 1, 5),
                (2, EventKind::Components, 0, 9),
            ]
        );
    }

    #[test]
    fn test_spilled_order_matches() {
        let build = |threshold| {
            let mut sequencer = Sequencer::new(threshold, None);
            for g in (1..=40u64).rev() {
                sequencer.push((g % 3) as u32, g * 2, merge(g, g)).unwrap();
                sequencer.push(0, g, flush(g)).unwrap();
            }
            sequencer
        };

        let spilled = build(7);
        assert!(spilled.spilled_runs() > 0);
        assert_eq!(order(build(1_000_000)), order(spilled));
    }

    #[test]
    fn test_fields_survive_spill() {
        let mut sequencer = Sequencer::new(1, None);
        sequencer.push(0, 1, merge(3, 123)).unwrap();
        sequencer.push(0, 2, flush(3)).unwrap();

        let events: Vec<SequencedEvent> = sequencer
            .finish()
            .unwrap()
            .collect::<SequencerResult<_>>()
            .unwrap();
        assert_eq!(events[0].fields[0], "3");
        assert_eq!(events[1].fields.last().map(String::as_str), Some("1_3:123"));
        assert!(matches!(events[1].event, Event::Merge(_)));
    }

    #[test]
    fn test_row_ordering() {
        let mut rows = vec![
            LiveComponentRow::new(2, &ComponentDescriptor::new(0, 5, 1)),
            LiveComponentRow::new(1, &ComponentDescriptor::new(1, 2, 1)),
            LiveComponentRow::new(2, &ComponentDescriptor::new(0, 3, 1)),
        ];
        rows.sort();
        assert_eq!(
            rows.iter().map(|r| (r.generation, r.index)).collect::<Vec<_>>(),
            vec![(1, 2), (2, 3), (2, 5)]
        );
    }
}
