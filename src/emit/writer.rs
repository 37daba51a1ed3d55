//! All-or-nothing artifact writer
//!
//! Rows go to a temporary file in the artifact's directory. `finish` moves it
//! over the final path only if every write succeeded; otherwise the temporary
//! file is dropped and the previous artifact, if any, is left untouched.

use crate::emit::error::{EmitError, EmitResult};
use serde::Serialize;
use std::fmt;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// The artifacts produced by one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Ordered event log
    Events,
    /// Per-generation metrics table
    Generations,
    /// Captured error blocks
    Diagnostics,
    /// Live components per snapshot generation
    Components,
    /// Every component created by a flush or merge
    Catalog,
    /// Best end-of-run stats line
    Summary,
}

impl ArtifactKind {
    pub fn all() -> &'static [ArtifactKind] {
        &[
            ArtifactKind::Events,
            ArtifactKind::Generations,
            ArtifactKind::Diagnostics,
            ArtifactKind::Components,
            ArtifactKind::Catalog,
            ArtifactKind::Summary,
        ]
    }

    /// File name for a task, e.g. `run.generations.log`
    pub fn file_name(&self, task_name: &str) -> String {
        match self {
            ArtifactKind::Events => format!("{}.events.log", task_name),
            ArtifactKind::Generations => format!("{}.generations.log", task_name),
            ArtifactKind::Diagnostics => format!("{}.err", task_name),
            ArtifactKind::Components => format!("{}.components.log", task_name),
            ArtifactKind::Catalog => format!("{}.catalog.log", task_name),
            ArtifactKind::Summary => format!("{}.summary.log", task_name),
        }
    }

    /// Tab-delimited rows, as opposed to verbatim text lines
    pub fn is_tabular(&self) -> bool {
        !matches!(self, ArtifactKind::Diagnostics)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Events => "events",
            ArtifactKind::Generations => "generations",
            ArtifactKind::Diagnostics => "diagnostics",
            ArtifactKind::Components => "components",
            ArtifactKind::Catalog => "catalog",
            ArtifactKind::Summary => "summary",
        };
        write!(f, "{}", name)
    }
}

/// What happened to one artifact
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactOutcome {
    pub kind: ArtifactKind,
    pub path: PathBuf,
    pub rows: u64,
    /// `None` when the artifact was written
    pub error: Option<String>,
}

impl ArtifactOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

enum Sink {
    Rows(csv::Writer<NamedTempFile>),
    Text(BufWriter<NamedTempFile>),
}

/// Writer for a single artifact
///
/// The first error is remembered and every later write becomes a no-op, so
/// callers can stream rows without checking each one.
pub struct ArtifactWriter {
    kind: ArtifactKind,
    path: PathBuf,
    sink: Option<Sink>,
    rows: u64,
    error: Option<EmitError>,
}

impl ArtifactWriter {
    pub fn create(kind: ArtifactKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();

        match open_temp(&path) {
            Ok(temp) => {
                let sink = if kind.is_tabular() {
                    Sink::Rows(
                        csv::WriterBuilder::new()
                            .delimiter(b'\t')
                            .has_headers(false)
                            .flexible(true)
                            .quote_style(csv::QuoteStyle::Never)
                            .terminator(csv::Terminator::Any(b'\n'))
                            .from_writer(temp),
                    )
                } else {
                    Sink::Text(BufWriter::new(temp))
                };
                Self {
                    kind,
                    path,
                    sink: Some(sink),
                    rows: 0,
                    error: None,
                }
            }
            Err(e) => Self {
                kind,
                path,
                sink: None,
                rows: 0,
                error: Some(e),
            },
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    fn fail(&mut self, reason: String) {
        self.sink = None;
        self.error = Some(EmitError::Write {
            path: self.path.clone(),
            reason,
        });
    }

    /// Write one tab-delimited row
    pub fn write_row<I, T>(&mut self, fields: I)
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        let result = match self.sink.as_mut() {
            Some(Sink::Rows(writer)) => writer.write_record(fields).map_err(|e| e.to_string()),
            Some(Sink::Text(writer)) => {
                let mut result = Ok(());
                for (i, field) in fields.into_iter().enumerate() {
                    let sep: &[u8] = if i == 0 { b"" } else { b"\t" };
                    result = writer
                        .write_all(sep)
                        .and_then(|_| writer.write_all(field.as_ref()));
                    if result.is_err() {
                        break;
                    }
                }
                result
                    .and_then(|_| writer.write_all(b"\n"))
                    .map_err(|e| e.to_string())
            }
            None => return,
        };

        match result {
            Ok(()) => self.rows += 1,
            Err(reason) => self.fail(reason),
        }
    }

    /// Write one verbatim line; a newline is appended
    pub fn write_line(&mut self, line: &str) {
        self.write_row([line]);
    }

    fn commit(sink: Sink, path: &Path) -> EmitResult<()> {
        let write_error = |reason: String| EmitError::Write {
            path: path.to_path_buf(),
            reason,
        };

        let temp = match sink {
            Sink::Rows(writer) => writer
                .into_inner()
                .map_err(|e| write_error(e.error().to_string()))?,
            Sink::Text(writer) => writer
                .into_inner()
                .map_err(|e| write_error(e.error().to_string()))?,
        };

        temp.as_file()
            .sync_all()
            .map_err(|e| write_error(e.to_string()))?;

        temp.persist(path).map_err(|e| EmitError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }

    /// Move the artifact into place, or discard it if anything failed
    pub fn finish(mut self) -> ArtifactOutcome {
        let sink = self.sink.take();
        if let (Some(sink), true) = (sink, self.error.is_none()) {
            if let Err(e) = Self::commit(sink, &self.path) {
                self.error = Some(e);
            }
        }

        match &self.error {
            None => tracing::debug!("Wrote {} ({} rows) to {:?}", self.kind, self.rows, self.path),
            Some(e) => tracing::error!("Artifact {} not written: {}", self.kind, e),
        }

        ArtifactOutcome {
            kind: self.kind,
            path: self.path,
            rows: self.rows,
            error: self.error.map(|e| e.to_string()),
        }
    }
}

fn open_temp(path: &Path) -> EmitResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    );

    tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| EmitError::Create {
            path: path.to_path_buf(),
            source: e,
        })
}
