//! Core data types for engine telemetry events
//!
//! This module defines the values the parser produces from log lines:
//! - `ComponentDescriptor`: one on-disk component (`level_index:sizeBytes`)
//! - `Event`: flush, merge, or live-component snapshot
//! - `EventKind`: the discriminant, with its ordering rank
//! - `ParsedLine`: an event plus the raw fields it was parsed from

use serde::{Deserialize, Serialize};

/// One immutable on-disk component, as reported by the engine
///
/// Serialized in logs as `<level>_<index>:<sizeBytes>`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ComponentDescriptor {
    /// Compaction level tag
    pub level: u32,
    /// Component index within its level
    pub index: u64,
    /// On-disk size in bytes
    pub size_bytes: u64,
}

impl ComponentDescriptor {
    pub fn new(level: u32, index: u64, size_bytes: u64) -> Self {
        Self {
            level,
            index,
            size_bytes,
        }
    }

    /// Name without the size, e.g. `1_7`
    pub fn name(&self) -> String {
        format!("{}_{}", self.level, self.index)
    }
}

impl std::fmt::Display for ComponentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}:{}", self.level, self.index, self.size_bytes)
    }
}

/// Sum of `size_bytes` over a component list
pub fn total_size(components: &[ComponentDescriptor]) -> u64 {
    components.iter().map(|c| c.size_bytes).sum()
}

/// Number of distinct level tags in a component list
pub fn distinct_levels(components: &[ComponentDescriptor]) -> u32 {
    let mut levels: Vec<u32> = components.iter().map(|c| c.level).collect();
    levels.sort_unstable();
    levels.dedup();
    levels.len() as u32
}

/// An in-memory table was persisted to a new component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FlushEvent {
    pub generation: u64,
    pub total_flushed: u64,
    pub total_merged: u64,
    /// `None` when the descriptor field was malformed
    pub new_component: Option<ComponentDescriptor>,
}

/// One or more components were compacted into a new set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeEvent {
    /// Flush generation active when the merge was scheduled
    pub generation: u64,
    pub total_merged: u64,
    pub new_components: Vec<ComponentDescriptor>,
}

/// Authoritative listing of every component currently on disk
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComponentsSnapshot {
    pub generation: u64,
    pub live_components: Vec<ComponentDescriptor>,
}

/// A telemetry event recovered from a log line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Event {
    Flush(FlushEvent),
    Merge(MergeEvent),
    Components(ComponentsSnapshot),
}

impl Event {
    /// Flush counter in effect when the event occurred
    pub fn generation(&self) -> u64 {
        match self {
            Event::Flush(e) => e.generation,
            Event::Merge(e) => e.generation,
            Event::Components(e) => e.generation,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::Flush(_) => EventKind::Flush,
            Event::Merge(_) => EventKind::Merge,
            Event::Components(_) => EventKind::Components,
        }
    }

    /// Components this event brought into existence (flush or merge output)
    pub fn created_components(&self) -> &[ComponentDescriptor] {
        match self {
            Event::Flush(e) => e.new_component.as_slice(),
            Event::Merge(e) => &e.new_components,
            Event::Components(_) => &[],
        }
    }
}

/// Event discriminant
///
/// Variant order is the tie-break rank inside one generation: a flush opens
/// its generation, merges scheduled during it follow, snapshots come last.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Flush,
    Merge,
    Components,
}

impl EventKind {
    pub fn all() -> &'static [EventKind] {
        &[EventKind::Flush, EventKind::Merge, EventKind::Components]
    }

    /// Tag literal as it appears in engine logs
    pub fn tag(&self) -> &'static str {
        match self {
            EventKind::Flush => "[FLUSH]",
            EventKind::Merge => "[MERGE]",
            EventKind::Components => "[COMPONENTS]",
        }
    }

    /// Number of tab-delimited fields following the tag
    pub fn arity(&self) -> usize {
        match self {
            EventKind::Flush => 7,
            EventKind::Merge => 8,
            EventKind::Components => 2,
        }
    }

    /// Single-letter code leading each row of the ordered event log
    pub fn code(&self) -> &'static str {
        match self {
            EventKind::Flush => "F",
            EventKind::Merge => "M",
            EventKind::Components => "C",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Flush => write!(f, "flush"),
            EventKind::Merge => write!(f, "merge"),
            EventKind::Components => write!(f, "components"),
        }
    }
}

/// A recognised telemetry line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParsedLine {
    pub event: Event,
    /// Fields after the tag (and dataset name), verbatim
    pub fields: Vec<String>,
}
