//! Emitter error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while writing one artifact
#[derive(Error, Debug)]
pub enum EmitError {
    /// The temporary file next to the artifact could not be created
    #[error("Failed to create {path:?}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row could not be written
    #[error("Failed to write {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },

    /// The finished temporary file could not be moved into place
    #[error("Failed to persist {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EmitError {
    pub fn path(&self) -> &PathBuf {
        match self {
            EmitError::Create { path, .. } => path,
            EmitError::Write { path, .. } => path,
            EmitError::Persist { path, .. } => path,
        }
    }
}

/// Result type alias for emitter operations
pub type EmitResult<T> = Result<T, EmitError>;
