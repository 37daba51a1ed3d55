//! # lsmtrace
//!
//! LSM compaction telemetry reconstruction - rebuilds the flush/merge history
//! of an LSM storage engine, and the per-generation tree metrics, from the
//! logs the engine wrote during a benchmark run.
//!
//! ## Features
//!
//! - **Log sources**: Plain, gzip, LZ4 and zip files selected by glob
//! - **Error blocks**: Stack traces are kept away from the parser and captured
//! - **Ordering**: Stable external sort by generation, spilling to disk
//! - **Metrics**: Dense per-generation table plus a best-stats summary
//! - **Artifacts**: All-or-nothing writes, one outcome per artifact
//!
//! ## Modules
//!
//! - [`source`]: Log file enumeration, readers and the error block filter
//! - [`events`]: Event data model and line parser
//! - [`sequencer`]: External sort of events by generation
//! - [`metrics`]: Generation table fold and summary reduction
//! - [`emit`]: Artifact writers
//! - [`pipeline`]: One reconstruction run end to end
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lsmtrace::{Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig {
//!         log_dir: "/data/engine/logs".into(),
//!         pattern: "nc-*.log*".to_string(),
//!         output_dir: "./out".into(),
//!         task_name: "ycsb-a".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let report = Pipeline::new(config).run().await?;
//!     println!(
//!         "{} generations, {} files skipped",
//!         report.generations,
//!         report.failures.len()
//!     );
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod emit;
pub mod events;
pub mod metrics;
pub mod pipeline;
pub mod sequencer;
pub mod source;

// Re-export top-level types for convenience
pub use config::{generate_default_config, Config, ConfigError};

pub use events::{ComponentDescriptor, Event, EventKind, EventParser, LineOutcome, ParsedLine};

pub use source::{ErrorBlockFilter, FilterAction, FilterState, LogSource, SourceError};

pub use sequencer::{ExternalSorter, SequenceKey, Sequencer, SequencerError};

pub use metrics::{BestStats, GenerationRecord, GenerationTable, MetricsReconstructor, StatsLine};

pub use emit::{ArtifactKind, ArtifactOutcome, EmitError, Emitter};

pub use pipeline::{
    Pipeline, PipelineConfig, PipelineError, PipelineResult, RunReport, SummaryReport,
};
