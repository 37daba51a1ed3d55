//! Sequencer error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while sorting, spilling or merging runs
#[derive(Error, Debug)]
pub enum SequencerError {
    /// I/O operation on a spill file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization of spilled items failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// LZ4 frame could not be decompressed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Spill run failed validation (bad magic, checksum mismatch, truncation)
    #[error("Corrupt spill run {path:?}: {reason}")]
    CorruptRun { path: PathBuf, reason: String },
}

impl From<bincode::Error> for SequencerError {
    fn from(err: bincode::Error) -> Self {
        SequencerError::Serialization(err.to_string())
    }
}

/// Result type alias for sequencer operations
pub type SequencerResult<T> = Result<T, SequencerError>;
