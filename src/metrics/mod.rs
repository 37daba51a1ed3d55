//! Metrics reconstruction
//!
//! - **table**: Per-generation records and the event fold
//! - **summary**: Single best end-of-run stats line
//!
//! Two reductions over the same logs serve different callers: the full
//! `GenerationTable` describes the whole run, `BestStats` only its final
//! counters.

pub mod summary;
pub mod table;

pub use summary::{parse_stats_line, BestStats, StatsLine, STATS_TAG};
pub use table::{
    GenerationRecord, GenerationTable, MetricsReconstructor, DEFAULT_MAX_GENERATION_GAP,
};
