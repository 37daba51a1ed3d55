//! Engine log sources
//!
//! - **pattern**: File name globs
//! - **reader**: Plain, gzip, LZ4 and zip backed line readers
//! - **filter**: Error block state machine
//! - **quiescence**: One-shot check of the engine's I/O flag files
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! LogSource::open(dir, glob) → [LogFile (ordinal, path, encoding)]
//!   LogFile::for_each_line → ErrorBlockFilter → parser | diagnostics
//! ```
//!
//! Files are listed in file-name order and that position (the ordinal) is the
//! only ordering a source promises. Files are read independently.

pub mod error;
pub mod filter;
pub mod pattern;
pub mod quiescence;
pub mod reader;

pub use error::{SourceError, SourceResult};
pub use filter::{has_level_marker, transition, ErrorBlockFilter, FilterAction, FilterState};
pub use pattern::FilePattern;
pub use quiescence::Quiescence;
pub use reader::{Encoding, LogFile};

use std::path::{Path, PathBuf};

/// The set of log files selected for one run
#[derive(Debug, Clone)]
pub struct LogSource {
    dir: PathBuf,
    pattern: FilePattern,
    files: Vec<LogFile>,
}

impl LogSource {
    /// List regular files in `dir` whose name matches `pattern`
    pub fn open(dir: impl AsRef<Path>, pattern: &str) -> SourceResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let pattern = FilePattern::new(pattern)?;

        let io_error = |e: std::io::Error| SourceError::Io {
            path: dir.clone(),
            source: e,
        };

        let metadata = match std::fs::metadata(&dir) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SourceError::NotFound(dir.clone()));
            }
            Err(e) => return Err(io_error(e)),
        };
        if !metadata.is_dir() {
            return Err(SourceError::NotADirectory(dir.clone()));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(io_error)? {
            let path = entry.map_err(io_error)?.path();
            if !path.is_file() {
                continue;
            }

            let matched = path
                .file_name()
                .map(|name| pattern.matches(&name.to_string_lossy()))
                .unwrap_or(false);
            if matched {
                paths.push(path);
            }
        }

        paths.sort();

        let files: Vec<LogFile> = paths
            .into_iter()
            .enumerate()
            .map(|(ordinal, path)| LogFile::new(ordinal as u32, path))
            .collect();

        tracing::info!(
            "Found {} log files in {:?} matching '{}'",
            files.len(),
            dir,
            pattern
        );

        Ok(Self {
            dir,
            pattern,
            files,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn pattern(&self) -> &FilePattern {
        &self.pattern
    }

    pub fn files(&self) -> &[LogFile] {
        &self.files
    }

    pub fn into_files(self) -> Vec<LogFile> {
        self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");

        match LogSource::open(&missing, "*") {
            Err(SourceError::NotFound(path)) => assert_eq!(path, missing),
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_file_instead_of_directory() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("nc.log");
        std::fs::write(&file, "x").unwrap();

        assert!(matches!(
            LogSource::open(&file, "*"),
            Err(SourceError::NotADirectory(_))
        ));
    }

    #[test]
    fn test_files_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["nc-red-2.log.gz", "cc.log", "nc-red-1.log", "nc-red.log"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nc-red-dir")).unwrap();

        let source = LogSource::open(dir.path(), "nc-red*").unwrap();
        let names: Vec<String> = source
            .files()
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().to_string())
            .collect();

        assert_eq!(names, vec!["nc-red-1.log", "nc-red-2.log.gz", "nc-red.log"]);
        assert_eq!(
            source.files().iter().map(|f| f.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(source.files()[1].encoding, Encoding::Gzip);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempdir().unwrap();
        let source = LogSource::open(dir.path(), "*.log").unwrap();
        assert!(source.is_empty());
    }
}
