//! Per-generation metrics table
//!
//! One record per flush generation, stored densely: generation `g` lives in
//! slot `g - 1`. Missing generations are filled with carried-forward defaults
//! so the table never has holes.

use crate::events::{distinct_levels, total_size, ComponentDescriptor, Event};
use serde::{Deserialize, Serialize};

/// State of the engine as of one flush generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub total_flushed: u64,
    pub total_merged: u64,
    pub num_levels: u32,
    /// Largest merge output observed while this generation was active
    pub temp_space_peak_bytes: u64,
}

impl GenerationRecord {
    /// Record that precedes generation 1
    const INITIAL: GenerationRecord = GenerationRecord {
        total_flushed: 0,
        total_merged: 0,
        num_levels: 1,
        temp_space_peak_bytes: 0,
    };

    /// Default for generation `generation`, carrying counters from `prev`
    fn carried(generation: u64, prev: &GenerationRecord) -> Self {
        Self {
            total_flushed: generation,
            total_merged: prev.total_merged,
            num_levels: prev.num_levels,
            temp_space_peak_bytes: 0,
        }
    }
}

/// Dense, growable array of generation records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationTable {
    records: Vec<GenerationRecord>,
}

impl GenerationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the table so generation `generation` has a record
    ///
    /// Existing records are never touched. Generation 0 is not a valid key
    /// and leaves the table as it is.
    pub fn ensure(&mut self, generation: u64) -> Option<&mut GenerationRecord> {
        if generation == 0 {
            return None;
        }

        while (self.records.len() as u64) < generation {
            let next = self.records.len() as u64 + 1;
            let prev = self.records.last().copied().unwrap_or(GenerationRecord::INITIAL);
            self.records.push(GenerationRecord::carried(next, &prev));
        }

        self.records.get_mut((generation - 1) as usize)
    }

    pub fn get(&self, generation: u64) -> Option<&GenerationRecord> {
        generation
            .checked_sub(1)
            .and_then(|slot| self.records.get(slot as usize))
    }

    /// Record preceding `generation`, or the initial record for generation 1
    fn previous(&self, generation: u64) -> GenerationRecord {
        self.get(generation.saturating_sub(1))
            .copied()
            .unwrap_or(GenerationRecord::INITIAL)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending generation order
    pub fn rows(&self) -> &[GenerationRecord] {
        &self.records
    }
}

/// Generations allowed past the end of the table before an event is
/// treated as garbage
pub const DEFAULT_MAX_GENERATION_GAP: u64 = 1_000_000;

/// Folds the sequenced event stream into a `GenerationTable`
///
/// Events are applied in sequence order as they stream past. A snapshot sorts
/// after the flush and merges of its own generation, so its level count is the
/// last word for that generation and is what later flushes carry forward.
#[derive(Debug)]
pub struct MetricsReconstructor {
    table: GenerationTable,
    max_generation_gap: u64,
    unallocated_merges: u64,
    out_of_range: u64,
}

impl Default for MetricsReconstructor {
    fn default() -> Self {
        Self {
            table: GenerationTable::new(),
            max_generation_gap: DEFAULT_MAX_GENERATION_GAP,
            unallocated_merges: 0,
            out_of_range: 0,
        }
    }
}

impl MetricsReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject events more than `gap` generations past the end of the table
    pub fn with_max_generation_gap(mut self, gap: u64) -> Self {
        self.max_generation_gap = gap;
        self
    }

    pub fn apply_flush(&mut self, generation: u64) {
        // fill any gap first so the carried counters come from g - 1
        self.table.ensure(generation.saturating_sub(1));
        let prev = self.table.previous(generation);
        if let Some(record) = self.table.ensure(generation) {
            *record = GenerationRecord::carried(generation, &prev);
        }
    }

    pub fn apply_merge(
        &mut self,
        generation: u64,
        total_merged: u64,
        new_components: &[ComponentDescriptor],
    ) {
        if self.table.get(generation).is_none() {
            self.unallocated_merges += 1;
            tracing::debug!(
                "Merge reported against generation {} before its flush",
                generation
            );
        }

        if let Some(record) = self.table.ensure(generation) {
            record.total_merged = total_merged;
            record.temp_space_peak_bytes = record
                .temp_space_peak_bytes
                .max(total_size(new_components));
        }
    }

    pub fn apply_level_count(&mut self, generation: u64, level_count: u32) {
        if let Some(record) = self.table.ensure(generation) {
            record.num_levels = level_count;
        }
    }

    pub fn apply_snapshot(&mut self, generation: u64, live_components: &[ComponentDescriptor]) {
        self.apply_level_count(generation, distinct_levels(live_components));
    }

    /// Route one event from the sequenced stream
    ///
    /// Returns `false` without touching the table when the event's generation
    /// lies beyond the allowed gap. Such a generation is almost always a
    /// garbled line, and honouring it would allocate every record up to it.
    pub fn apply_event(&mut self, event: &Event) -> bool {
        let generation = event.generation();
        let limit = (self.table.len() as u64).saturating_add(self.max_generation_gap);
        if generation > limit {
            self.out_of_range += 1;
            tracing::warn!(
                "Ignoring {} event for generation {} (table ends at {})",
                event.kind(),
                generation,
                self.table.len()
            );
            return false;
        }

        match event {
            Event::Flush(flush) => self.apply_flush(flush.generation),
            Event::Merge(merge) => {
                self.apply_merge(merge.generation, merge.total_merged, &merge.new_components)
            }
            Event::Components(snapshot) => {
                self.apply_snapshot(snapshot.generation, &snapshot.live_components)
            }
        }
        true
    }

    /// Merges that arrived for a generation with no record yet
    pub fn unallocated_merges(&self) -> u64 {
        self.unallocated_merges
    }

    /// Events refused by `apply_event` for lying past the allowed gap
    pub fn out_of_range_events(&self) -> u64 {
        self.out_of_range
    }

    pub fn table(&self) -> &GenerationTable {
        &self.table
    }

    pub fn finish(self) -> GenerationTable {
        self.table
    }
}
