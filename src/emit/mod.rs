//! Artifact output
//!
//! - **writer**: Atomic per-artifact writer and outcomes
//! - **error**: Error types
//!
//! Every artifact is independent: a failure is recorded in its
//! `ArtifactOutcome` and the remaining artifacts are still attempted.
//!
//! | artifact    | file                     | row                                   |
//! |-------------|--------------------------|---------------------------------------|
//! | events      | `<task>.events.log`      | `F\|M\|C`, then the raw fields         |
//! | generations | `<task>.generations.log` | `flushed merged levels peakBytes`     |
//! | diagnostics | `<task>.err`             | captured line, verbatim               |
//! | components  | `<task>.components.log`  | `generation level_index sizeBytes`    |
//! | catalog     | `<task>.catalog.log`     | `level_index sizeBytes`               |
//! | summary     | `<task>.summary.log`     | `flushCount mergeCount info`          |

pub mod error;
pub mod writer;

pub use error::{EmitError, EmitResult};
pub use writer::{ArtifactKind, ArtifactOutcome, ArtifactWriter};

use crate::metrics::{GenerationTable, StatsLine};
use crate::sequencer::{CatalogRow, LiveComponentRow, SequencedEvent};
use std::path::{Path, PathBuf};

/// Names and opens the artifacts of one task
#[derive(Debug, Clone)]
pub struct Emitter {
    dir: PathBuf,
    task_name: String,
}

impl Emitter {
    pub fn new(dir: impl Into<PathBuf>, task_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            task_name: task_name.into(),
        }
    }

    /// Create the output directory
    ///
    /// A failure here is only logged: each artifact will then report its own
    /// `Create` error.
    pub fn prepare(&self) {
        if let Err(e) = std::fs::create_dir_all(&self.dir) {
            tracing::warn!("Could not create output directory {:?}: {}", self.dir, e);
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name(&self.task_name))
    }

    pub fn open(&self, kind: ArtifactKind) -> ArtifactWriter {
        ArtifactWriter::create(kind, self.path(kind))
    }

    /// Write the metrics table, one row per generation
    pub fn write_generations(&self, table: &GenerationTable) -> ArtifactOutcome {
        let mut writer = self.open(ArtifactKind::Generations);
        for record in table.rows() {
            writer.write_row([
                record.total_flushed.to_string(),
                record.total_merged.to_string(),
                record.num_levels.to_string(),
                record.temp_space_peak_bytes.to_string(),
            ]);
        }
        writer.finish()
    }

    /// Write the best stats line, or an empty file when there is none
    pub fn write_summary(&self, best: Option<&StatsLine>) -> ArtifactOutcome {
        let mut writer = self.open(ArtifactKind::Summary);
        if let Some(stats) = best {
            writer.write_row([
                stats.flush_count.to_string(),
                stats.merge_count.to_string(),
                stats.info.clone(),
            ]);
        }
        writer.finish()
    }
}

/// Append one sequenced event to the ordered event log
pub fn write_event(writer: &mut ArtifactWriter, event: &SequencedEvent) {
    let code = event.key.kind.code();
    writer.write_row(std::iter::once(code).chain(event.fields.iter().map(String::as_str)));
}

pub fn write_live_component(writer: &mut ArtifactWriter, row: &LiveComponentRow) {
    writer.write_row([
        row.generation.to_string(),
        row.component().name(),
        row.size_bytes.to_string(),
    ]);
}

pub fn write_catalog_entry(writer: &mut ArtifactWriter, row: &CatalogRow) {
    writer.write_row([row.component().name(), row.size_bytes.to_string()]);
}
