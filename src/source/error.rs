//! Log source error types
//!
//! Enumeration failures are fatal for a run. Per-file failures (`Corrupt`,
//! `Io`) are recorded and the remaining files are still read.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while locating or reading engine logs
#[derive(Error, Debug)]
pub enum SourceError {
    /// Log directory does not exist
    #[error("Log directory not found: {0:?}")]
    NotFound(PathBuf),

    /// Log path exists but is not a directory
    #[error("Not a directory: {0:?}")]
    NotADirectory(PathBuf),

    /// File name pattern could not be compiled
    #[error("Invalid file pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A compressed or archived log failed to decode
    #[error("Corrupt log file {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    /// I/O failure on a specific file
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An engine I/O flag file is still present
    #[error("Engine is not quiescent: {0:?} exists")]
    NotQuiescent(PathBuf),
}

impl SourceError {
    /// Whether this error only concerns one file and the run may continue
    pub fn is_per_file(&self) -> bool {
        matches!(self, SourceError::Corrupt { .. } | SourceError::Io { .. })
    }
}

/// Result type alias for source operations
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::NotFound(PathBuf::from("/missing"));
        assert_eq!(err.to_string(), "Log directory not found: \"/missing\"");

        let err = SourceError::Corrupt {
            path: PathBuf::from("nc-1.log.gz"),
            reason: "invalid gzip header".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Corrupt log file \"nc-1.log.gz\": invalid gzip header"
        );
    }

    #[test]
    fn test_per_file_classification() {
        let corrupt = SourceError::Corrupt {
            path: PathBuf::from("a.gz"),
            reason: String::new(),
        };
        assert!(corrupt.is_per_file());
        assert!(!SourceError::NotFound(PathBuf::from("x")).is_per_file());
    }
}
